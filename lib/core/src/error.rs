//! Error handling foundation for the chime engine.
//!
//! This module provides the `Result` type alias using rootcause, plus the
//! few error types owned by the core crate itself. Each crate defines its
//! own domain-specific error types in its own error module; service entry
//! points wrap them in a `Report` as they propagate up the stack.

use rootcause::Report;
use std::fmt;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

/// Errors from canonical datetime and timezone handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// The text does not match the canonical datetime format.
    InvalidDateTime { input: String, reason: String },
    /// The local time does not exist in the timezone (DST gap).
    NonexistentLocalTime { input: String, timezone: String },
    /// The timezone name is not a known IANA zone.
    UnknownTimezone { timezone: String },
}

impl fmt::Display for TimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDateTime { input, reason } => {
                write!(f, "invalid datetime '{input}': {reason}")
            }
            Self::NonexistentLocalTime { input, timezone } => {
                write!(f, "local time '{input}' does not exist in {timezone}")
            }
            Self::UnknownTimezone { timezone } => write!(f, "unknown timezone: {timezone}"),
        }
    }
}

impl std::error::Error for TimeError {}

/// Errors from engine configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A duration setting must be greater than zero.
    ZeroDuration { setting: &'static str },
    /// A duration setting exceeds the supported ceiling.
    DurationTooLong {
        setting: &'static str,
        max_seconds: u64,
    },
    /// The sweep cadence is longer than the bucket window.
    SweepSlowerThanWindow {
        sweep_interval_seconds: u64,
        bucket_window_seconds: u64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDuration { setting } => write!(f, "{setting} must be greater than zero"),
            Self::DurationTooLong {
                setting,
                max_seconds,
            } => write!(f, "{setting} must be at most {max_seconds} seconds"),
            Self::SweepSlowerThanWindow {
                sweep_interval_seconds,
                bucket_window_seconds,
            } => write!(
                f,
                "sweep interval ({sweep_interval_seconds}s) exceeds bucket window ({bucket_window_seconds}s)"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_type_works() {
        let ok: Result<i32> = Ok(42);
        assert_eq!(ok.expect("should be ok"), 42);
    }

    #[test]
    fn time_error_display() {
        let err = TimeError::UnknownTimezone {
            timezone: "Mars/Olympus".to_string(),
        };
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::SweepSlowerThanWindow {
            sweep_interval_seconds: 600,
            bucket_window_seconds: 360,
        };
        assert!(err.to_string().contains("600s"));
    }
}
