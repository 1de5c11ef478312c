pub mod stage;

pub use stage::{CorrelationStage, IngestOutcome, PendingAcoustic};
