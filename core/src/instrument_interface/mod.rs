pub mod command;
pub mod records;

pub use command::{CommandSink, RecordingSink, TriggerCommand};
pub use records::{AcousticRecord, CurrentRecord, StreamKind, StreamRecord, TrackBatch, TrackRecord};
