//! Conversation log for the chime reminder engine.
//!
//! This crate provides:
//!
//! - **Log entries**: The append-only record of what an actor and the
//!   assistant said, including delivered reminders
//! - **History window**: The bounded slice of the log handed to the
//!   interpreter

pub mod history;
pub mod message;

pub use history::HistoryWindow;
pub use message::{EntryKind, LogEntry, Role, contains_message};
