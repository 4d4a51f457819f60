//! Error types for the store crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`: Failures of a single store operation, including the
//!   failed condition of a conditional write

use std::fmt;

/// Errors from store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The record does not exist.
    NotFound { key: String },
    /// A conditional create found an existing record.
    AlreadyExists { key: String },
    /// A conditional update's condition did not hold.
    ConditionFailed { key: String, reason: String },
    /// The backend could not complete the operation.
    Backend { reason: String },
    /// A stored value could not be encoded or decoded.
    Serialization { reason: String },
}

impl StoreError {
    /// Returns true for a failed conditional write.
    #[must_use]
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, Self::ConditionFailed { .. })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { key } => write!(f, "record not found: {key}"),
            Self::AlreadyExists { key } => write!(f, "record already exists: {key}"),
            Self::ConditionFailed { key, reason } => {
                write!(f, "condition failed for {key}: {reason}")
            }
            Self::Backend { reason } => write!(f, "store backend failed: {reason}"),
            Self::Serialization { reason } => write!(f, "store serialization failed: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_failed_display() {
        let err = StoreError::ConditionFailed {
            key: "actor 123".to_string(),
            reason: "locked".to_string(),
        };
        assert!(err.is_condition_failed());
        assert_eq!(err.to_string(), "condition failed for actor 123: locked");
    }

    #[test]
    fn backend_is_not_condition_failure() {
        let err = StoreError::Backend {
            reason: "timeout".to_string(),
        };
        assert!(!err.is_condition_failed());
    }
}
