//! Error types for the inbound crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `LockError`: The actor lock could not be taken in time
//! - `ExecuteError`: A validated command could not be applied
//! - `TurnError`: One conversational turn failed and the user gets an
//!   apology
//! - `ProcessError`: High-level wrapper for a message that could not be
//!   handled at all

use chime_ai::{CommandError, InterpretError};
use chime_core::ActorId;
use chime_store::StoreError;
use std::fmt;

/// Errors from the per-actor lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Another holder kept the lock for the whole wait.
    Timeout { actor_id: ActorId, waited_secs: u64 },
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout {
                actor_id,
                waited_secs,
            } => write!(f, "actor {actor_id} still locked after {waited_secs}s"),
        }
    }
}

impl std::error::Error for LockError {}

/// Errors from applying a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteError {
    /// The index does not name an upcoming reminder.
    UnknownIndex { index: usize, available: usize },
    /// A store write failed.
    Store { reason: String },
}

impl fmt::Display for ExecuteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownIndex { index, available } => write!(
                f,
                "no upcoming reminder at index {index} ({available} available)"
            ),
            Self::Store { reason } => write!(f, "store write failed: {reason}"),
        }
    }
}

impl std::error::Error for ExecuteError {}

impl From<StoreError> for ExecuteError {
    fn from(e: StoreError) -> Self {
        Self::Store {
            reason: e.to_string(),
        }
    }
}

/// Errors that end a turn with an apology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    /// Reading or writing actor or event records failed.
    Store { source: StoreError },
    /// The interpreter gave no usable answer.
    Interpret { source: InterpretError },
    /// Command text still did not parse after the retry.
    Commands { source: CommandError },
    /// A command could not be applied.
    Execute { source: ExecuteError },
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store { source } => write!(f, "store failure: {source}"),
            Self::Interpret { source } => write!(f, "interpreter failure: {source}"),
            Self::Commands { source } => write!(f, "unusable command text: {source}"),
            Self::Execute { source } => write!(f, "command failed: {source}"),
        }
    }
}

impl std::error::Error for TurnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store { source } => Some(source),
            Self::Interpret { source } => Some(source),
            Self::Commands { source } => Some(source),
            Self::Execute { source } => Some(source),
        }
    }
}

impl From<StoreError> for TurnError {
    fn from(source: StoreError) -> Self {
        Self::Store { source }
    }
}

impl From<InterpretError> for TurnError {
    fn from(source: InterpretError) -> Self {
        Self::Interpret { source }
    }
}

impl From<CommandError> for TurnError {
    fn from(source: CommandError) -> Self {
        Self::Commands { source }
    }
}

impl From<ExecuteError> for TurnError {
    fn from(source: ExecuteError) -> Self {
        Self::Execute { source }
    }
}

/// High-level message processing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The actor record could not be read or created.
    ActorUnavailable { actor_id: ActorId, reason: String },
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActorUnavailable { actor_id, reason } => {
                write!(f, "actor {actor_id} unavailable: {reason}")
            }
        }
    }
}

impl std::error::Error for ProcessError {}
