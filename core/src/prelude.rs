use chrono::Utc;

/// Seconds since the unix epoch, as carried by every instrument record.
pub type Timestamp = f64;

/// Wall-clock time in the same representation as record timestamps.
pub fn unix_now() -> Timestamp {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Common error type for the fusion core.
#[derive(thiserror::Error, Debug)]
pub enum FusionError {
    #[error("malformed {stream} record: {reason}")]
    MalformedRecord { stream: String, reason: String },
    #[error("identity mismatch while merging track {expected}: found {found}")]
    IdentityMismatch { expected: u32, found: u32 },
    #[error("index {index} out of bounds for table {table} (len {len})")]
    IndexOutOfBounds {
        table: &'static str,
        index: usize,
        len: usize,
    },
    #[error("slot {index} of table {table} is empty")]
    EmptySlot { table: &'static str, index: usize },
    #[error("unknown target {0}")]
    UnknownTarget(u64),
    #[error("target {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: u64,
        from: &'static str,
        to: &'static str,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid hyperspace rules: {0}")]
    Hyperspace(String),
    #[error("feature vector could not be classified")]
    Unclassifiable,
    #[error("trigger dispatch failed: {0}")]
    Dispatch(String),
    #[error("decode failure: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("history table failure: {0}")]
    History(#[from] csv::Error),
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl FusionError {
    /// Internal-consistency violations that must never be swallowed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FusionError::IdentityMismatch { .. }
                | FusionError::IndexOutOfBounds { .. }
                | FusionError::EmptySlot { .. }
                | FusionError::Internal(_)
        )
    }
}

pub type FusionResult<T> = Result<T, FusionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_internal_consistency_violations() {
        assert!(FusionError::IdentityMismatch {
            expected: 1,
            found: 2
        }
        .is_fatal());
        assert!(FusionError::IndexOutOfBounds {
            table: "track",
            index: 9,
            len: 2
        }
        .is_fatal());
        assert!(!FusionError::Unclassifiable.is_fatal());
        assert!(!FusionError::MalformedRecord {
            stream: "track".into(),
            reason: "nan".into()
        }
        .is_fatal());
    }

    #[test]
    fn unix_now_is_after_2020() {
        assert!(unix_now() > 1_577_836_800.0);
    }
}
