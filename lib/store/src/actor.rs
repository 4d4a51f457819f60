//! Actor records.

use crate::event::EventKey;
use chime_conversation::LogEntry;
use chime_core::{ActorId, MessageId, parse_timezone};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Number of inbound message ids remembered per actor.
pub const RECENT_MESSAGE_CAPACITY: usize = 3;

/// Advisory lock serializing work on one actor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockState {
    /// Whether a holder claims the lock.
    pub locked: bool,
    /// When the current holder took it.
    pub locked_at: Option<DateTime<Utc>>,
}

impl LockState {
    /// Returns true if the lock is held by someone and was taken at or after
    /// `stale_before`.
    ///
    /// A lock without a timestamp is treated as stale.
    #[must_use]
    pub fn is_held(&self, stale_before: DateTime<Utc>) -> bool {
        self.locked && self.locked_at.is_some_and(|at| at >= stale_before)
    }
}

/// Bounded ring of the most recent inbound message ids, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecentMessages(Vec<MessageId>);

impl RecentMessages {
    /// Builds a ring from stored ids, keeping the newest entries.
    #[must_use]
    pub fn from_ids(mut ids: Vec<MessageId>) -> Self {
        ids.truncate(RECENT_MESSAGE_CAPACITY);
        Self(ids)
    }

    /// Returns true if the id is in the ring.
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.0.contains(id)
    }

    /// Pushes an id to the front, evicting the oldest beyond capacity.
    pub fn push(&mut self, id: MessageId) {
        self.0.insert(0, id);
        self.0.truncate(RECENT_MESSAGE_CAPACITY);
    }

    /// Returns the ids, newest first.
    #[must_use]
    pub fn as_slice(&self) -> &[MessageId] {
        &self.0
    }
}

/// Whether the actor agreed to be messaged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentState {
    /// Never asked or never answered.
    #[default]
    Pending,
    /// Agreed.
    Granted,
    /// Refused.
    Declined,
}

/// Usage counters kept per actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    /// Inbound text messages accepted.
    pub messages_sent: u64,
    /// Distinct days with at least one accepted message.
    pub active_days: BTreeSet<NaiveDate>,
    /// Reminders currently owned.
    pub reminders_created: u64,
    /// When the actor was first seen.
    pub created_at: DateTime<Utc>,
    /// Last accepted message.
    pub last_active_at: Option<DateTime<Utc>>,
}

impl UsageStats {
    /// Creates empty stats for an actor first seen at `created_at`.
    #[must_use]
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            messages_sent: 0,
            active_days: BTreeSet::new(),
            reminders_created: 0,
            created_at,
            last_active_at: None,
        }
    }

    /// Records an accepted message.
    pub fn record_message(&mut self, at: DateTime<Utc>) {
        self.messages_sent += 1;
        self.active_days.insert(at.date_naive());
        self.last_active_at = Some(at);
    }
}

/// A user of the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Identifier (phone number).
    pub id: ActorId,
    /// Display name, once known.
    pub name: Option<String>,
    /// IANA timezone name, once known.
    pub timezone: Option<String>,
    /// Append-only conversation log.
    pub conversation: Vec<LogEntry>,
    /// Keys of the reminders the actor owns.
    pub events: Vec<EventKey>,
    /// Lock state.
    pub lock: LockState,
    /// Recent inbound message ids.
    pub recent_message_ids: RecentMessages,
    /// Messaging consent.
    pub consent: ConsentState,
    /// Usage counters.
    pub stats: UsageStats,
}

impl Actor {
    /// Creates a fresh actor seen for the first time at `now`.
    #[must_use]
    pub fn new(id: ActorId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: None,
            timezone: None,
            conversation: Vec::new(),
            events: Vec::new(),
            lock: LockState::default(),
            recent_message_ids: RecentMessages::default(),
            consent: ConsentState::Pending,
            stats: UsageStats::new(now),
        }
    }

    /// Returns the parsed timezone, if set and valid.
    #[must_use]
    pub fn tz(&self) -> Option<Tz> {
        self.timezone
            .as_deref()
            .and_then(|name| parse_timezone(name).ok())
    }

    /// Returns true once both name and a valid timezone are known.
    #[must_use]
    pub fn is_set_up(&self) -> bool {
        self.name.as_deref().is_some_and(|name| !name.trim().is_empty()) && self.tz().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn ring_keeps_three_newest_first() {
        let mut ring = RecentMessages::default();
        for id in ["m1", "m2", "m3", "m4"] {
            ring.push(MessageId::new(id));
        }
        let ids: Vec<&str> = ring.as_slice().iter().map(MessageId::as_str).collect();
        assert_eq!(ids, vec!["m4", "m3", "m2"]);
        assert!(!ring.contains(&MessageId::new("m1")));
    }

    #[test]
    fn lock_staleness() {
        let lock = LockState {
            locked: true,
            locked_at: Some(now()),
        };
        assert!(lock.is_held(now() - Duration::minutes(15)));
        assert!(!lock.is_held(now() + Duration::seconds(1)));
        assert!(!LockState::default().is_held(now()));
    }

    #[test]
    fn lock_without_timestamp_is_stale() {
        let lock = LockState {
            locked: true,
            locked_at: None,
        };
        assert!(!lock.is_held(now()));
    }

    #[test]
    fn setup_requires_name_and_valid_timezone() {
        let mut actor = Actor::new(ActorId::new("1"), now());
        assert!(!actor.is_set_up());
        actor.name = Some("Ada".to_string());
        actor.timezone = Some("Not/AZone".to_string());
        assert!(!actor.is_set_up());
        actor.timezone = Some("Europe/Paris".to_string());
        assert!(actor.is_set_up());
    }

    #[test]
    fn stats_count_distinct_days() {
        let mut stats = UsageStats::new(now());
        stats.record_message(now());
        stats.record_message(now() + Duration::hours(1));
        stats.record_message(now() + Duration::days(1));
        assert_eq!(stats.messages_sent, 3);
        assert_eq!(stats.active_days.len(), 2);
        assert_eq!(stats.last_active_at, Some(now() + Duration::days(1)));
    }
}
