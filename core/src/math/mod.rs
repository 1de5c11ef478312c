pub mod geometry;
pub mod matrix;
pub mod stats;

pub use geometry::GeometryHelper;
pub use matrix::MatrixHelper;
pub use stats::StatsHelper;
