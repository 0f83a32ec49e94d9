//! Trajectory error types
//!
//! Defines all errors reported by the store. Every failure is an
//! explicit result value; nothing aborts during normal operation.

use crate::types::Instant;
use thiserror::Error;

/// Errors that can occur in the trajectory store
#[derive(Error, Debug)]
pub enum TrajectoryError {
    /// An append or attach would break the time ordering
    #[error("out of order: {t} does not follow {last}")]
    OutOfOrder { t: Instant, last: Instant },

    /// A segment handle is not owned by this trajectory
    #[error("segment not found in this trajectory")]
    NotFound,

    /// A serialized message is structurally invalid
    #[error("corrupt message: {0}")]
    Corrupt(String),

    /// The consistency check detected an invariant violation
    #[error("inconsistent trajectory: {0}")]
    Inconsistent(String),
}

impl From<bincode::Error> for TrajectoryError {
    fn from(err: bincode::Error) -> Self {
        TrajectoryError::Corrupt(err.to_string())
    }
}

/// Result type alias for trajectory operations
pub type TrajectoryResult<T> = Result<T, TrajectoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrajectoryError::NotFound;
        assert_eq!(err.to_string(), "segment not found in this trajectory");

        let err = TrajectoryError::Corrupt("bad magic".to_string());
        assert_eq!(err.to_string(), "corrupt message: bad magic");
    }

    #[test]
    fn test_out_of_order_display() {
        let err = TrajectoryError::OutOfOrder {
            t: Instant::from_millis(1000),
            last: Instant::from_millis(2000),
        };
        assert!(err.to_string().starts_with("out of order"));
    }
}
