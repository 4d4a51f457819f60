//! In-memory store.
//!
//! Implements both store traits over a single mutex. Conditional writes are
//! evaluated under the lock, so they are atomic within one process. Failure
//! injection hooks let tests exercise the error paths of the sweep and the
//! inbound pipeline.

use crate::actor::{Actor, ConsentState, RecentMessages, UsageStats};
use crate::error::StoreError;
use crate::event::{Event, EventKey, TimeBucket};
use crate::repository::{ActorStore, EventStore};
use async_trait::async_trait;
use chime_conversation::LogEntry;
use chime_core::ActorId;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    events: BTreeMap<EventKey, Event>,
    actors: HashMap<ActorId, Actor>,
    failing_claims: HashSet<EventKey>,
    failing_puts: bool,
}

/// Store keeping every record in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|e| StoreError::Backend {
            reason: format!("store mutex poisoned: {e}"),
        })
    }

    fn with_actor<T>(
        &self,
        id: &ActorId,
        f: impl FnOnce(&mut Actor) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self.state()?;
        let actor = state.actors.get_mut(id).ok_or_else(|| StoreError::NotFound {
            key: format!("actor {id}"),
        })?;
        f(actor)
    }

    /// Makes every later claim of `key` fail with a backend error.
    pub fn fail_claims_for(&self, key: EventKey) {
        if let Ok(mut state) = self.state() {
            state.failing_claims.insert(key);
        }
    }

    /// Makes every later event write fail with a backend error.
    pub fn fail_puts(&self, failing: bool) {
        if let Ok(mut state) = self.state() {
            state.failing_puts = failing;
        }
    }

    /// Returns a snapshot of every stored event, in key order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.state()
            .map(|state| state.events.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns a snapshot of one actor.
    #[must_use]
    pub fn actor(&self, id: &ActorId) -> Option<Actor> {
        self.state()
            .ok()
            .and_then(|state| state.actors.get(id).cloned())
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn put(&self, event: &Event) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if state.failing_puts {
            return Err(StoreError::Backend {
                reason: "injected put failure".to_string(),
            });
        }
        state.events.insert(event.key(), event.clone());
        Ok(())
    }

    async fn get(&self, key: &EventKey) -> Result<Option<Event>, StoreError> {
        Ok(self.state()?.events.get(key).cloned())
    }

    async fn delete(&self, key: &EventKey) -> Result<bool, StoreError> {
        let removed = self.state()?.events.remove(key).is_some();
        if !removed {
            tracing::debug!(key = %key, "delete of absent event");
        }
        Ok(removed)
    }

    async fn batch_get(&self, keys: &[EventKey]) -> Result<Vec<Event>, StoreError> {
        let unique: BTreeSet<&EventKey> = keys.iter().collect();
        let state = self.state()?;
        let mut events: Vec<Event> = unique
            .into_iter()
            .filter_map(|key| state.events.get(key).cloned())
            .collect();
        events.sort_by(|a, b| a.from_ts.cmp(&b.from_ts).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn scan_due_unclaimed(&self, bucket: TimeBucket) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .state()?
            .events
            .values()
            .filter(|event| event.bucket == bucket && !event.claimed)
            .cloned()
            .collect())
    }

    async fn mark_claimed(&self, key: &EventKey) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        if state.failing_claims.contains(key) {
            return Err(StoreError::Backend {
                reason: "injected claim failure".to_string(),
            });
        }
        let event = state.events.get_mut(key).ok_or_else(|| StoreError::NotFound {
            key: format!("event {key}"),
        })?;
        let was_unclaimed = !event.claimed;
        event.claimed = true;
        Ok(was_unclaimed)
    }
}

#[async_trait]
impl ActorStore for InMemoryStore {
    async fn load(&self, id: &ActorId) -> Result<Option<Actor>, StoreError> {
        Ok(self.state()?.actors.get(id).cloned())
    }

    async fn create(&self, actor: &Actor) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if state.actors.contains_key(&actor.id) {
            return Err(StoreError::AlreadyExists {
                key: format!("actor {}", actor.id),
            });
        }
        state.actors.insert(actor.id.clone(), actor.clone());
        Ok(())
    }

    async fn try_lock(
        &self,
        id: &ActorId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_actor(id, |actor| {
            if actor.lock.is_held(stale_before) {
                return Err(StoreError::ConditionFailed {
                    key: format!("actor {id}"),
                    reason: "lock held".to_string(),
                });
            }
            actor.lock.locked = true;
            actor.lock.locked_at = Some(now);
            Ok(())
        })
    }

    async fn unlock(&self, id: &ActorId) -> Result<(), StoreError> {
        self.with_actor(id, |actor| {
            actor.lock.locked = false;
            Ok(())
        })
    }

    async fn set_recent_message_ids(
        &self,
        id: &ActorId,
        ids: &RecentMessages,
    ) -> Result<(), StoreError> {
        self.with_actor(id, |actor| {
            actor.recent_message_ids = ids.clone();
            Ok(())
        })
    }

    async fn append_conversation(
        &self,
        id: &ActorId,
        entries: &[LogEntry],
    ) -> Result<(), StoreError> {
        self.with_actor(id, |actor| {
            actor.conversation.extend_from_slice(entries);
            Ok(())
        })
    }

    async fn append_events(&self, id: &ActorId, keys: &[EventKey]) -> Result<(), StoreError> {
        self.with_actor(id, |actor| {
            actor.events.extend_from_slice(keys);
            Ok(())
        })
    }

    async fn set_events(&self, id: &ActorId, keys: &[EventKey]) -> Result<(), StoreError> {
        self.with_actor(id, |actor| {
            actor.events = keys.to_vec();
            Ok(())
        })
    }

    async fn replace_event(
        &self,
        id: &ActorId,
        old: &EventKey,
        new: &EventKey,
    ) -> Result<(), StoreError> {
        self.with_actor(id, |actor| {
            match actor.events.iter().position(|key| key == old) {
                Some(at) => actor.events[at] = new.clone(),
                None => actor.events.push(new.clone()),
            }
            Ok(())
        })
    }

    async fn set_name(&self, id: &ActorId, name: &str) -> Result<(), StoreError> {
        self.with_actor(id, |actor| {
            actor.name = Some(name.to_string());
            Ok(())
        })
    }

    async fn set_timezone(&self, id: &ActorId, timezone: &str) -> Result<(), StoreError> {
        self.with_actor(id, |actor| {
            actor.timezone = Some(timezone.to_string());
            Ok(())
        })
    }

    async fn set_consent(&self, id: &ActorId, consent: ConsentState) -> Result<(), StoreError> {
        self.with_actor(id, |actor| {
            actor.consent = consent;
            Ok(())
        })
    }

    async fn set_stats(&self, id: &ActorId, stats: &UsageStats) -> Result<(), StoreError> {
        self.with_actor(id, |actor| {
            actor.stats = stats.clone();
            Ok(())
        })
    }
}
