pub mod dispatch;
pub mod rules;

pub use dispatch::{TriggerEngine, TriggerStatus};
pub use rules::{TriggerContext, TriggerDecision, TriggerRule, TriggerRules};
