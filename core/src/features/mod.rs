pub mod extractor;
pub mod vector;

pub use extractor::FeatureExtractor;
pub use vector::{AxisRange, Feature, FeatureMap, FeatureVector, FEATURE_COUNT};
