//! Track correlation, classification and save-trigger core for the
//! multi-instrument monitoring platform.
//!
//! Instrument decoders hand typed records to [`FusionEngine::ingest`]; the
//! correlation stage folds them into targets, eligible targets flow through the
//! LIFO classification queue to the [`ClassificationWorker`], and the trigger
//! engine turns classified targets into rate-limited save commands.

pub mod classification;
pub mod config;
pub mod correlation;
pub mod engine;
pub mod features;
pub mod instrument_interface;
pub mod math;
pub mod prelude;
pub mod storage;
pub mod targets;
pub mod telemetry;
pub mod triggers;

pub use classification::{ClassificationQueue, ClassificationWorker, Classifier, ClassifierHistory};
pub use config::FusionConfig;
pub use engine::{FusionEngine, IngestReport, IngestStatus};
pub use instrument_interface::{CommandSink, StreamRecord, TriggerCommand};
pub use prelude::{FusionError, FusionResult, Timestamp};
