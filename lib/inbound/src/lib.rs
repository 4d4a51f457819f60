//! Inbound message handling for the chime reminder engine.
//!
//! This crate provides:
//!
//! - **User lock**: Cross-process mutual exclusion per actor, with stale
//!   lock takeover
//! - **Dedup guard**: Drops messages the channel delivers more than once
//! - **Consent gate**: Opt-in for numbers that require it
//! - **Command executor**: Applies validated commands to the stores
//! - **Message processor**: The end-to-end pipeline from an inbound message
//!   to the reply

pub mod consent;
pub mod dedup;
pub mod error;
pub mod execute;
pub mod lock;
pub mod pipeline;
pub mod reply;
pub mod slash;

pub use consent::{is_eu_number, requires_opt_in};
pub use dedup::{Admission, DedupGuard};
pub use error::{ExecuteError, LockError, ProcessError, TurnError};
pub use execute::CommandExecutor;
pub use lock::UserLock;
pub use pipeline::{InboundMessage, MessageBody, MessageProcessor, ProcessOutcome};
pub use slash::SlashCommand;
