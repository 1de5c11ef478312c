pub mod merge;
pub mod registry;
pub mod target;

pub use merge::TrackAggregate;
pub use registry::TargetRegistry;
pub use target::{Provenance, RecordRefs, Review, Target, TargetId, TargetState};
