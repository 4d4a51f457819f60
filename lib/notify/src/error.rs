//! Error types for the notify crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `NotifyError`: Failures delivering one outbound message

use std::fmt;

/// Errors from sending a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The request never reached the channel.
    ConnectionFailed { reason: String },
    /// The channel answered with a non-success status.
    Rejected { status: u16, body: String },
    /// The channel is not configured.
    InvalidConfig { reason: String },
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { reason } => write!(f, "connection failed: {reason}"),
            Self::Rejected { status, body } => {
                write!(f, "message rejected with status {status}: {body}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid notifier config: {reason}"),
        }
    }
}

impl std::error::Error for NotifyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_display() {
        let err = NotifyError::Rejected {
            status: 400,
            body: "bad template".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "message rejected with status 400: bad template"
        );
    }
}
