//! Replay protection for inbound messages.

use chime_conversation::contains_message;
use chime_core::{ActorId, MessageId};
use chime_store::{Actor, ActorStore, StoreError};
use std::sync::Arc;
use tracing::debug;

/// Result of [`DedupGuard::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First delivery; the id is now recorded.
    Accepted,
    /// Seen before; nothing was changed.
    Duplicate,
}

/// Drops messages the channel delivers more than once.
pub struct DedupGuard {
    actors: Arc<dyn ActorStore>,
}

impl DedupGuard {
    /// Creates a guard.
    #[must_use]
    pub fn new(actors: Arc<dyn ActorStore>) -> Self {
        Self { actors }
    }

    /// Returns true if `actor` has already handled `message_id`, either in
    /// the recent-id ring or in its conversation log.
    #[must_use]
    pub fn seen(actor: &Actor, message_id: &MessageId) -> bool {
        actor.recent_message_ids.contains(message_id)
            || contains_message(&actor.conversation, message_id)
    }

    /// Loads the actor and checks `message_id`. An unknown actor has seen
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn is_duplicate(
        &self,
        actor_id: &ActorId,
        message_id: &MessageId,
    ) -> Result<bool, StoreError> {
        Ok(self
            .actors
            .load(actor_id)
            .await?
            .is_some_and(|actor| Self::seen(&actor, message_id)))
    }

    /// Records `message_id` on `actor` unless it was seen before.
    ///
    /// # Errors
    ///
    /// Returns the store error if the ring could not be saved; `actor` is
    /// left unchanged in that case.
    pub async fn admit(
        &self,
        actor: &mut Actor,
        message_id: &MessageId,
    ) -> Result<Admission, StoreError> {
        if Self::seen(actor, message_id) {
            debug!(actor_id = %actor.id, message_id = %message_id, "duplicate message");
            return Ok(Admission::Duplicate);
        }
        let mut ring = actor.recent_message_ids.clone();
        ring.push(message_id.clone());
        self.actors.set_recent_message_ids(&actor.id, &ring).await?;
        actor.recent_message_ids = ring;
        Ok(Admission::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_conversation::LogEntry;
    use chime_store::InMemoryStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    async fn setup() -> (InMemoryStore, DedupGuard, Actor) {
        let store = InMemoryStore::new();
        let actor = Actor::new(ActorId::new("15550001111"), now());
        store.create(&actor).await.unwrap();
        let guard = DedupGuard::new(Arc::new(store.clone()));
        (store, guard, actor)
    }

    #[tokio::test]
    async fn replay_is_rejected_without_mutation() {
        let (store, guard, mut actor) = setup().await;
        let id = MessageId::new("m1");

        assert_eq!(guard.admit(&mut actor, &id).await.unwrap(), Admission::Accepted);
        let after_first = store.actor(&actor.id).unwrap();

        assert_eq!(guard.admit(&mut actor, &id).await.unwrap(), Admission::Duplicate);
        assert_eq!(store.actor(&actor.id).unwrap(), after_first);
        assert!(guard.is_duplicate(&actor.id, &id).await.unwrap());
    }

    #[tokio::test]
    async fn ring_keeps_three_newest_first() {
        let (store, guard, mut actor) = setup().await;
        for id in ["m1", "m2", "m3", "m4"] {
            guard.admit(&mut actor, &MessageId::new(id)).await.unwrap();
        }
        let stored = store.actor(&actor.id).unwrap();
        let ids: Vec<_> = stored
            .recent_message_ids
            .as_slice()
            .iter()
            .map(MessageId::as_str)
            .collect();
        assert_eq!(ids, ["m4", "m3", "m2"]);
        assert!(!guard.is_duplicate(&actor.id, &MessageId::new("m1")).await.unwrap());
    }

    #[tokio::test]
    async fn id_in_conversation_is_duplicate() {
        let (_store, guard, mut actor) = setup().await;
        actor
            .conversation
            .push(LogEntry::user("hi", now()).with_message_id(MessageId::new("old")));
        assert_eq!(
            guard.admit(&mut actor, &MessageId::new("old")).await.unwrap(),
            Admission::Duplicate
        );
    }

    #[tokio::test]
    async fn unknown_actor_has_seen_nothing() {
        let (_store, guard, _actor) = setup().await;
        assert!(!guard
            .is_duplicate(&ActorId::new("nobody"), &MessageId::new("m1"))
            .await
            .unwrap());
    }
}
