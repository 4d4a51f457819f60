//! Per-actor mutual exclusion.
//!
//! The lock lives in the actor record and is taken with a conditional
//! write, so it holds across processes. A holder that never unlocks is
//! overtaken once its lock is older than the configured timeout.

use crate::error::LockError;
use chime_core::{ActorId, Clock, EngineConfig};
use chime_store::{ActorStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Lock serializing message handling for one actor.
pub struct UserLock {
    actors: Arc<dyn ActorStore>,
    clock: Arc<dyn Clock>,
    timeout: chrono::Duration,
    poll_interval: Duration,
    wait: Duration,
}

impl UserLock {
    /// Creates a lock using the timeout and polling settings of `config`.
    #[must_use]
    pub fn new(actors: Arc<dyn ActorStore>, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self {
            actors,
            clock,
            timeout: config.lock_timeout(),
            poll_interval: config.lock_poll_interval(),
            wait: config.lock_wait(),
        }
    }

    /// Makes one attempt. Returns false if someone else holds a fresh lock.
    ///
    /// # Errors
    ///
    /// Returns the store error for anything but a failed condition.
    pub async fn try_lock(&self, actor_id: &ActorId) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let stale_before = now
            .checked_sub_signed(self.timeout)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        match self.actors.try_lock(actor_id, now, stale_before).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_condition_failed() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Polls until the lock is taken or the wait runs out. Store errors
    /// count as a failed attempt.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] when the wait runs out.
    pub async fn acquire(&self, actor_id: &ActorId) -> Result<(), LockError> {
        let started = self.clock.now();
        loop {
            match self.try_lock(actor_id).await {
                Ok(true) => return Ok(()),
                Ok(false) => debug!(actor_id = %actor_id, "actor locked, waiting"),
                Err(e) => warn!(actor_id = %actor_id, error = %e, "lock attempt failed"),
            }
            let waited = (self.clock.now() - started).to_std().unwrap_or_default();
            if waited >= self.wait {
                return Err(LockError::Timeout {
                    actor_id: actor_id.clone(),
                    waited_secs: waited.as_secs(),
                });
            }
            self.clock.sleep(self.poll_interval).await;
        }
    }

    /// Releases the lock.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn unlock(&self, actor_id: &ActorId) -> Result<(), StoreError> {
        self.actors.unlock(actor_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_core::ManualClock;
    use chime_store::{Actor, InMemoryStore};
    use chrono::{DateTime, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    async fn setup() -> (InMemoryStore, ManualClock, ActorId) {
        let store = InMemoryStore::new();
        let clock = ManualClock::new(start());
        let id = ActorId::new("15550001111");
        store.create(&Actor::new(id.clone(), start())).await.unwrap();
        (store, clock, id)
    }

    fn lock(store: &InMemoryStore, clock: &ManualClock) -> UserLock {
        UserLock::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            &EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn concurrent_attempts_have_one_winner() {
        let (store, clock, id) = setup().await;
        let first = lock(&store, &clock);
        let second = lock(&store, &clock);
        let (a, b) = tokio::join!(first.try_lock(&id), second.try_lock(&id));
        let wins = [a.unwrap(), b.unwrap()].iter().filter(|won| **won).count();
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn abandoned_lock_is_taken_over_after_timeout() {
        let (store, clock, id) = setup().await;
        let holder = lock(&store, &clock);
        assert!(holder.try_lock(&id).await.unwrap());

        clock.advance(chrono::Duration::minutes(15));
        let other = lock(&store, &clock);
        assert!(!other.try_lock(&id).await.unwrap());

        clock.advance(chrono::Duration::seconds(1));
        assert!(other.try_lock(&id).await.unwrap());
    }

    #[tokio::test]
    async fn unlock_frees_immediately() {
        let (store, clock, id) = setup().await;
        let lock = lock(&store, &clock);
        assert!(lock.try_lock(&id).await.unwrap());
        lock.unlock(&id).await.unwrap();
        assert!(lock.try_lock(&id).await.unwrap());
    }

    #[tokio::test]
    async fn acquire_times_out_after_wait() {
        let (store, clock, id) = setup().await;
        let lock = lock(&store, &clock);
        assert!(lock.try_lock(&id).await.unwrap());

        let err = lock.acquire(&id).await.unwrap_err();
        assert_eq!(
            err,
            LockError::Timeout {
                actor_id: id.clone(),
                waited_secs: 60
            }
        );
        assert_eq!(clock.sleeps().len(), 12);
        assert!(clock.sleeps().iter().all(|d| *d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn acquire_waits_out_a_lock_near_expiry() {
        let (store, clock, id) = setup().await;
        let lock = lock(&store, &clock);
        assert!(lock.try_lock(&id).await.unwrap());

        // 870s in, the holder's lock goes stale during the wait.
        clock.advance(chrono::Duration::seconds(870));
        lock.acquire(&id).await.unwrap();
        assert_eq!(clock.now(), start() + chrono::Duration::seconds(905));
    }

    #[tokio::test]
    async fn oversized_timeout_never_goes_stale() {
        let (store, clock, id) = setup().await;
        let config = EngineConfig {
            lock_timeout_seconds: u64::MAX,
            ..EngineConfig::default()
        };
        let holder = UserLock::new(Arc::new(store.clone()), Arc::new(clock.clone()), &config);
        assert!(holder.try_lock(&id).await.unwrap());

        clock.advance(chrono::Duration::days(365));
        let other = UserLock::new(Arc::new(store.clone()), Arc::new(clock.clone()), &config);
        assert!(!other.try_lock(&id).await.unwrap());
    }

    #[tokio::test]
    async fn missing_actor_counts_as_failed_attempt() {
        let store = InMemoryStore::new();
        let clock = ManualClock::new(start());
        let lock = lock(&store, &clock);
        let id = ActorId::new("nobody");
        assert!(lock.try_lock(&id).await.is_err());
        assert!(matches!(
            lock.acquire(&id).await,
            Err(LockError::Timeout { .. })
        ));
    }
}
