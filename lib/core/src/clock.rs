//! Injectable time source.
//!
//! Every component that reads the current time or waits goes through a
//! [`Clock`], so lock polling and the sweep's wait-until-anchor step can be
//! driven by a [`ManualClock`] in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A source of the current instant that can also wait.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Waits for the given duration.
    async fn sleep(&self, duration: Duration);

    /// Waits until the given instant. Returns immediately if it has passed.
    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        if let Ok(remaining) = (deadline - self.now()).to_std()
            && !remaining.is_zero()
        {
            self.sleep(remaining).await;
        }
    }
}

/// Wall-clock time backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock whose time only moves when told to.
///
/// Sleeping advances the clock by the requested duration and returns
/// immediately, which keeps tests fast and deterministic.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
            slept: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = now.checked_add_signed(by) {
            *now = next;
        }
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }

    /// Returns every duration passed to [`Clock::sleep`], in call order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        self.advance(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn manual_sleep_advances_time() {
        let clock = ManualClock::new(start());
        clock.sleep(Duration::from_secs(5)).await;
        assert_eq!(clock.now(), start() + chrono::Duration::seconds(5));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn sleep_until_past_deadline_does_not_wait() {
        let clock = ManualClock::new(start());
        clock.sleep_until(start() - chrono::Duration::minutes(1)).await;
        assert!(clock.sleeps().is_empty());
        assert_eq!(clock.now(), start());
    }

    #[tokio::test]
    async fn sleep_until_future_deadline_lands_on_it() {
        let clock = ManualClock::new(start());
        let deadline = start() + chrono::Duration::seconds(90);
        clock.sleep_until(deadline).await;
        assert_eq!(clock.now(), deadline);
    }

    #[test]
    fn clones_share_time() {
        let clock = ManualClock::new(start());
        let other = clock.clone();
        other.advance(chrono::Duration::hours(1));
        assert_eq!(clock.now(), start() + chrono::Duration::hours(1));
    }
}
