pub mod table;
pub mod tables;

pub use table::RecordTable;
pub use tables::{TableKind, TableRecord, Tables};
