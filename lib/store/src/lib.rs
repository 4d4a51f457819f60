//! Storage layer for the chime reminder engine.
//!
//! This crate provides:
//!
//! - **Events**: Reminder occurrences keyed by `(time bucket, event id)`
//! - **Actors**: Per-user records holding the lock, the recent message ring,
//!   the conversation log and the list of owned events
//! - **Store traits**: [`EventStore`] and [`ActorStore`], the only shared
//!   mutable state in the system
//! - **In-memory store**: A complete implementation for tests and local runs

pub mod actor;
pub mod error;
pub mod event;
pub mod memory;
pub mod repository;

pub use actor::{
    Actor, ConsentState, LockState, RECENT_MESSAGE_CAPACITY, RecentMessages, UsageStats,
};
pub use error::StoreError;
pub use event::{Event, EventKey, TimeBucket};
pub use memory::InMemoryStore;
pub use repository::{ActorStore, EventStore};
