//! Core domain types and utilities for the chime reminder engine.
//!
//! This crate provides the foundational types shared by every other crate:
//!
//! - **Keys**: Strongly-typed actor, event and message identifiers
//! - **Clock**: Injectable time source, with a manual clock for tests
//! - **Time**: The canonical datetime text format and timezone helpers
//! - **Config**: The engine configuration passed to each component

pub mod clock;
pub mod config;
pub mod error;
pub mod id;
pub mod time;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{ConfigError, Result, TimeError};
pub use id::{ActorId, EntryId, EventId, MessageId, ParseIdError, SweepId};
pub use time::{CANONICAL_FORMAT, format_canonical, localize, parse_canonical, parse_timezone};
