//! Store traits.
//!
//! The event and actor stores are the only shared mutable state. Two writes
//! need compare-and-set semantics: [`ActorStore::create`] and
//! [`ActorStore::try_lock`]. [`EventStore::mark_claimed`] reports whether the
//! caller made the transition so a second claim never delivers twice.
//! Everything else is last-writer-wins per field.

use crate::actor::{Actor, ConsentState, RecentMessages, UsageStats};
use crate::error::StoreError;
use crate::event::{Event, EventKey, TimeBucket};
use async_trait::async_trait;
use chime_conversation::LogEntry;
use chime_core::ActorId;
use chrono::{DateTime, Utc};

/// Keyed, bucket-queryable storage of events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Inserts or replaces the event at its key.
    async fn put(&self, event: &Event) -> Result<(), StoreError>;

    /// Reads one event.
    async fn get(&self, key: &EventKey) -> Result<Option<Event>, StoreError>;

    /// Removes an event. Returns false if it did not exist.
    async fn delete(&self, key: &EventKey) -> Result<bool, StoreError>;

    /// Reads many events.
    ///
    /// Duplicate keys are read once and missing keys are skipped. Results are
    /// ordered by anchor, then by event id, so positions are stable across
    /// calls.
    async fn batch_get(&self, keys: &[EventKey]) -> Result<Vec<Event>, StoreError>;

    /// Returns every unclaimed event in one bucket.
    async fn scan_due_unclaimed(&self, bucket: TimeBucket) -> Result<Vec<Event>, StoreError>;

    /// Sets `claimed`. Returns true only if this call moved it from false to
    /// true.
    async fn mark_claimed(&self, key: &EventKey) -> Result<bool, StoreError>;
}

/// Storage of actor records.
#[async_trait]
pub trait ActorStore: Send + Sync {
    /// Reads an actor.
    async fn load(&self, id: &ActorId) -> Result<Option<Actor>, StoreError>;

    /// Creates an actor. Fails with [`StoreError::AlreadyExists`] if one is
    /// already stored under the id.
    async fn create(&self, actor: &Actor) -> Result<(), StoreError>;

    /// Takes the actor's lock at `now` if it is free or was taken before
    /// `stale_before`. Fails with [`StoreError::ConditionFailed`] otherwise.
    async fn try_lock(
        &self,
        id: &ActorId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Releases the actor's lock.
    async fn unlock(&self, id: &ActorId) -> Result<(), StoreError>;

    /// Replaces the recent message id ring.
    async fn set_recent_message_ids(
        &self,
        id: &ActorId,
        ids: &RecentMessages,
    ) -> Result<(), StoreError>;

    /// Appends entries to the conversation log.
    async fn append_conversation(
        &self,
        id: &ActorId,
        entries: &[LogEntry],
    ) -> Result<(), StoreError>;

    /// Appends keys to the actor's event list.
    async fn append_events(&self, id: &ActorId, keys: &[EventKey]) -> Result<(), StoreError>;

    /// Replaces the actor's event list.
    async fn set_events(&self, id: &ActorId, keys: &[EventKey]) -> Result<(), StoreError>;

    /// Swaps `old` for `new` in the actor's event list, keeping its
    /// position. Appends `new` if `old` is not listed.
    async fn replace_event(
        &self,
        id: &ActorId,
        old: &EventKey,
        new: &EventKey,
    ) -> Result<(), StoreError>;

    /// Sets the display name.
    async fn set_name(&self, id: &ActorId, name: &str) -> Result<(), StoreError>;

    /// Sets the timezone.
    async fn set_timezone(&self, id: &ActorId, timezone: &str) -> Result<(), StoreError>;

    /// Sets the consent state.
    async fn set_consent(&self, id: &ActorId, consent: ConsentState) -> Result<(), StoreError>;

    /// Replaces the usage stats.
    async fn set_stats(&self, id: &ActorId, stats: &UsageStats) -> Result<(), StoreError>;
}
