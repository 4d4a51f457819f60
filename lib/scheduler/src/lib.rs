//! Reminder scheduling for the chime engine.
//!
//! This crate provides:
//!
//! - **Frequency**: The `every [N] <unit>` / `once` grammar
//! - **Recurrence calculator**: Next occurrence and bounded series
//!   expansion in the actor's timezone, with a pluggable fallback resolver
//!   for free-form frequencies
//! - **Sweep**: The periodic scan that claims due events, reschedules
//!   recurring ones and delivers reminders

pub mod error;
pub mod frequency;
pub mod recurrence;
pub mod sweep;

pub use error::{RecurrenceError, SweepError};
pub use frequency::{Frequency, MIN_MINUTE_INTERVAL, TimeUnit};
pub use recurrence::{Expansion, OccurrenceResolver, RecurrenceCalculator};
pub use sweep::{RESCHEDULE_FAILED_NOTE, SchedulerSweep, SweepReport, TOO_FREQUENT_NOTE};
