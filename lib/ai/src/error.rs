//! Error types for the AI crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `LlmError`: Low-level LLM backend operations
//! - `CommandError`: Command text that does not fit the command table
//! - `InterpretError`: Interpreter calls that produced no usable answer

use std::fmt;

/// Errors from LLM backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Request failed.
    RequestFailed { reason: String },
    /// Provider answered with a non-success status.
    Rejected { status: u16, body: String },
    /// Response parsing failed.
    ResponseParseFailed { reason: String },
    /// Timeout waiting for response.
    Timeout,
    /// Rate limit exceeded.
    RateLimited { retry_after_secs: Option<u64> },
    /// Invalid configuration.
    InvalidConfig { reason: String },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestFailed { reason } => {
                write!(f, "LLM request failed: {reason}")
            }
            Self::Rejected { status, body } => {
                write!(f, "LLM provider rejected request ({status}): {body}")
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse LLM response: {reason}")
            }
            Self::Timeout => write!(f, "LLM request timed out"),
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid LLM configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for LlmError {}

/// Errors from parsing and validating command text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No line contained a known command.
    NoCommands,
    /// Wrong number of arguments.
    Arity {
        function: &'static str,
        expected: &'static [&'static str],
        got: Vec<String>,
    },
    /// The reminder index is not a non-negative integer.
    InvalidIndex { value: String },
    /// `from_date` was `none`.
    MissingStartDate,
    /// A date argument is not in the canonical format.
    InvalidDate {
        argument: &'static str,
        value: String,
        reason: String,
    },
    /// The timezone is not a known IANA name.
    InvalidTimezone { value: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCommands => write!(f, "could not extract any command from the message"),
            Self::Arity {
                function,
                expected,
                got,
            } => write!(
                f,
                "invalid number of arguments for function {function}. Expected: {expected:?}, got: {got:?}"
            ),
            Self::InvalidIndex { value } => {
                write!(f, "can't convert event index to a non-negative integer: {value}")
            }
            Self::MissingStartDate => write!(
                f,
                "from_date can't be none, it should use the format \"Thursday, 2023-04-06 18:00:00\""
            ),
            Self::InvalidDate {
                argument,
                value,
                reason,
            } => write!(f, "can't parse {argument}: {value} ({reason})"),
            Self::InvalidTimezone { value } => {
                write!(f, "invalid timezone: {value}. It should be an IANA name such as Europe/Paris")
            }
        }
    }
}

impl std::error::Error for CommandError {}

/// Errors from interpreter calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpretError {
    /// The backend call failed.
    Backend { source: LlmError },
    /// The backend answered with nothing.
    EmptyResponse,
    /// The answer did not have the expected shape.
    Malformed { reason: String },
}

impl fmt::Display for InterpretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { source } => write!(f, "interpreter backend failed: {source}"),
            Self::EmptyResponse => write!(f, "interpreter returned an empty response"),
            Self::Malformed { reason } => write!(f, "malformed interpreter answer: {reason}"),
        }
    }
}

impl std::error::Error for InterpretError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend { source } => Some(source),
            _ => None,
        }
    }
}

impl From<LlmError> for InterpretError {
    fn from(source: LlmError) -> Self {
        Self::Backend { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_error_display() {
        let err = LlmError::Rejected {
            status: 429,
            body: "slow down".to_string(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("slow down"));
    }

    #[test]
    fn arity_error_names_expected_arguments() {
        let err = CommandError::Arity {
            function: "delete",
            expected: &["event_index"],
            got: vec!["1".to_string(), "2".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("delete"));
        assert!(text.contains("event_index"));
    }

    #[test]
    fn interpret_error_wraps_backend_source() {
        let err = InterpretError::from(LlmError::Timeout);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("timed out"));
    }
}
