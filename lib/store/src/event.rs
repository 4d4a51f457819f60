//! Scheduled events and their bucket keys.

use chime_core::{ActorId, EventId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Start of a fixed-width time window, in Unix seconds.
///
/// Events are partitioned by the bucket containing their anchor so the sweep
/// finds due events with a keyed lookup instead of a full scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeBucket(i64);

impl TimeBucket {
    /// Returns the bucket of width `window` that contains `instant`.
    #[must_use]
    pub fn containing(instant: DateTime<Utc>, window: Duration) -> Self {
        let width = window.num_seconds().max(1);
        Self(instant.timestamp().div_euclid(width) * width)
    }

    /// Wraps a stored bucket value.
    #[must_use]
    pub const fn from_seconds(seconds: i64) -> Self {
        Self(seconds)
    }

    /// Returns the bucket start in Unix seconds.
    #[must_use]
    pub const fn as_seconds(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite key of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    /// Bucket of the event's anchor.
    pub bucket: TimeBucket,
    /// Event identifier.
    pub event_id: EventId,
}

impl EventKey {
    /// Creates a key.
    #[must_use]
    pub fn new(bucket: TimeBucket, event_id: EventId) -> Self {
        Self { bucket, event_id }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.event_id)
    }
}

/// One scheduled occurrence of a reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Deterministic identifier, see [`Event::derive_id`].
    pub id: EventId,
    /// Owner.
    pub actor_id: ActorId,
    /// Reminder text.
    pub name: String,
    /// Anchor: when this occurrence fires.
    pub from_ts: DateTime<Utc>,
    /// Inclusive end of the series, if any.
    pub to_ts: Option<DateTime<Utc>>,
    /// Frequency expression, `once` for one-off reminders.
    pub frequency: String,
    /// Set once when the sweep picks the event up; never reset.
    pub claimed: bool,
    /// Whether the sweep computes the next occurrence when claiming.
    pub reschedule: bool,
    /// Bucket containing `from_ts`.
    pub bucket: TimeBucket,
    /// Pre-expanded occurrences owned by this event.
    #[serde(default)]
    pub children: Vec<EventKey>,
    /// First occurrence of the series this event belongs to.
    pub series_anchor: DateTime<Utc>,
    /// Position of this event in its series; 0 for the first occurrence.
    #[serde(default)]
    pub occurrence: u32,
}

impl Event {
    /// Creates an unclaimed, rescheduling event.
    #[must_use]
    pub fn new(
        actor_id: ActorId,
        name: impl Into<String>,
        from_ts: DateTime<Utc>,
        to_ts: Option<DateTime<Utc>>,
        frequency: impl Into<String>,
        window: Duration,
    ) -> Self {
        let name = name.into();
        let frequency = frequency.into();
        Self {
            id: Self::derive_id(&actor_id, &name, from_ts, to_ts, &frequency),
            actor_id,
            name,
            from_ts,
            to_ts,
            frequency,
            claimed: false,
            reschedule: true,
            bucket: TimeBucket::containing(from_ts, window),
            children: Vec::new(),
            series_anchor: from_ts,
            occurrence: 0,
        }
    }

    /// Builds the identifier from the event's defining fields.
    ///
    /// The same reminder requested twice maps to the same key, which makes
    /// [`crate::EventStore::put`] an idempotent upsert.
    #[must_use]
    pub fn derive_id(
        actor_id: &ActorId,
        name: &str,
        from_ts: DateTime<Utc>,
        to_ts: Option<DateTime<Utc>>,
        frequency: &str,
    ) -> EventId {
        let to = to_ts.map_or(-1, |ts| ts.timestamp());
        EventId::new(format!(
            "{actor_id}:{name}:{}:{to}:{frequency}",
            from_ts.timestamp()
        ))
    }

    /// Sets whether the sweep reschedules this event.
    #[must_use]
    pub fn with_reschedule(mut self, reschedule: bool) -> Self {
        self.reschedule = reschedule;
        self
    }

    /// Sets the child occurrences.
    #[must_use]
    pub fn with_children(mut self, children: Vec<EventKey>) -> Self {
        self.children = children;
        self
    }

    /// Places the event at position `occurrence` of the series starting at
    /// `anchor`.
    #[must_use]
    pub fn with_series(mut self, anchor: DateTime<Utc>, occurrence: u32) -> Self {
        self.series_anchor = anchor;
        self.occurrence = occurrence;
        self
    }

    /// Returns the event's key.
    #[must_use]
    pub fn key(&self) -> EventKey {
        EventKey::new(self.bucket, self.id.clone())
    }

    /// Returns true if the event still lies ahead of `now`, either because it
    /// has not fired yet or because its series has not ended.
    #[must_use]
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.from_ts >= now || self.to_ts.is_some_and(|to| to >= now)
    }
}
