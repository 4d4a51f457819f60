//! Error types for the scheduler crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `RecurrenceError`: Errors computing occurrences from a frequency
//! - `SweepError`: High-level wrapper for a failed sweep tick

use chime_store::TimeBucket;
use std::fmt;

/// Errors from recurrence calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceError {
    /// The frequency expression is not in the canonical grammar.
    Parse { input: String, reason: String },
    /// The frequency is below the five-minute floor. Rescheduling is
    /// suppressed rather than failed.
    TooFrequent { input: String },
    /// Eager expansion would produce more occurrences than allowed.
    TooManyOccurrences { input: String, limit: usize },
    /// Date arithmetic left the representable range.
    OutOfRange { input: String },
    /// The fallback resolver failed or gave an unusable answer.
    Resolver { reason: String },
}

impl RecurrenceError {
    /// Returns true for the below-floor frequency case.
    #[must_use]
    pub fn is_too_frequent(&self) -> bool {
        matches!(self, Self::TooFrequent { .. })
    }
}

impl fmt::Display for RecurrenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { input, reason } => {
                write!(f, "could not parse frequency '{input}': {reason}")
            }
            Self::TooFrequent { input } => {
                write!(f, "frequency '{input}' is below the five minute floor")
            }
            Self::TooManyOccurrences { input, limit } => {
                write!(f, "frequency '{input}' expands to more than {limit} occurrences")
            }
            Self::OutOfRange { input } => {
                write!(f, "frequency '{input}' leaves the supported date range")
            }
            Self::Resolver { reason } => write!(f, "occurrence resolver failed: {reason}"),
        }
    }
}

impl std::error::Error for RecurrenceError {}

/// High-level sweep errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepError {
    /// The bucket scan failed; nothing was processed.
    ScanFailed { bucket: TimeBucket, reason: String },
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanFailed { bucket, reason } => {
                write!(f, "scan of bucket {bucket} failed: {reason}")
            }
        }
    }
}

impl std::error::Error for SweepError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_frequent_is_distinct_from_parse() {
        let too_frequent = RecurrenceError::TooFrequent {
            input: "every 3 minutes".to_string(),
        };
        let parse = RecurrenceError::Parse {
            input: "sometimes".to_string(),
            reason: "no match".to_string(),
        };
        assert!(too_frequent.is_too_frequent());
        assert!(!parse.is_too_frequent());
        assert!(parse.to_string().contains("sometimes"));
    }

    #[test]
    fn sweep_error_display() {
        let err = SweepError::ScanFailed {
            bucket: TimeBucket::from_seconds(720),
            reason: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "scan of bucket 720 failed: timeout");
    }
}
