pub mod classifier;
pub mod history;
pub mod label;
pub mod outlier;
pub mod queue;
pub mod radius;
pub mod worker;

pub use classifier::{Classification, Classifier};
pub use history::{history_date, ClassifierHistory};
pub use label::Label;
pub use outlier::OutlierRules;
pub use queue::ClassificationQueue;
pub use radius::{BruteForceIndex, Neighbor, RadiusQuery};
pub use worker::ClassificationWorker;
