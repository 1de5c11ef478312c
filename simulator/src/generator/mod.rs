pub mod scenario;
pub mod tide;

pub use scenario::{restamp, ScenarioConfig, ScenarioGenerator};
