//! Engine configuration.
//!
//! A single [`EngineConfig`] is built once at startup and handed to each
//! component at construction; no component reads the environment itself.

use crate::error::ConfigError;
use crate::id::ActorId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ceiling on every duration setting: one week.
pub const MAX_DURATION_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Configuration shared by the sweep and the inbound pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Actor that receives failure reports for VIP actors.
    #[serde(default)]
    pub operator_id: Option<ActorId>,

    /// Actors whose failures are forwarded to the operator.
    #[serde(default)]
    pub vip_list: Vec<ActorId>,

    /// When false, outbound messages are logged instead of sent.
    #[serde(default = "default_messaging_enabled")]
    pub messaging_enabled: bool,

    /// Width of a time bucket, in seconds.
    #[serde(default = "default_bucket_window_seconds")]
    pub bucket_window_seconds: u64,

    /// Age after which a held actor lock is considered stale.
    #[serde(default = "default_lock_timeout_seconds")]
    pub lock_timeout_seconds: u64,

    /// Delay between lock attempts while waiting.
    #[serde(default = "default_lock_poll_interval_seconds")]
    pub lock_poll_interval_seconds: u64,

    /// Longest time a message waits for its actor's lock.
    #[serde(default = "default_lock_wait_seconds")]
    pub lock_wait_seconds: u64,

    /// Cadence of the periodic sweep.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    /// Actor whose events the sweep skips entirely.
    #[serde(default = "default_test_actor_id")]
    pub test_actor_id: ActorId,

    /// Most conversation entries handed to the interpreter.
    #[serde(default = "default_history_max_entries")]
    pub history_max_entries: usize,

    /// Oldest conversation entry handed to the interpreter, in hours.
    #[serde(default = "default_history_max_age_hours")]
    pub history_max_age_hours: u64,

    /// Upper bound on occurrences produced by one eager expansion.
    #[serde(default = "default_max_expanded_occurrences")]
    pub max_expanded_occurrences: usize,
}

fn seconds(value: u64) -> chrono::Duration {
    i64::try_from(value)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

fn default_messaging_enabled() -> bool {
    true
}

fn default_bucket_window_seconds() -> u64 {
    360
}

fn default_lock_timeout_seconds() -> u64 {
    15 * 60
}

fn default_lock_poll_interval_seconds() -> u64 {
    5
}

fn default_lock_wait_seconds() -> u64 {
    60
}

fn default_sweep_interval_seconds() -> u64 {
    300
}

fn default_test_actor_id() -> ActorId {
    ActorId::new("test")
}

fn default_history_max_entries() -> usize {
    20
}

fn default_history_max_age_hours() -> u64 {
    48
}

fn default_max_expanded_occurrences() -> usize {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operator_id: None,
            vip_list: Vec::new(),
            messaging_enabled: default_messaging_enabled(),
            bucket_window_seconds: default_bucket_window_seconds(),
            lock_timeout_seconds: default_lock_timeout_seconds(),
            lock_poll_interval_seconds: default_lock_poll_interval_seconds(),
            lock_wait_seconds: default_lock_wait_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            test_actor_id: default_test_actor_id(),
            history_max_entries: default_history_max_entries(),
            history_max_age_hours: default_history_max_age_hours(),
            max_expanded_occurrences: default_max_expanded_occurrences(),
        }
    }
}

impl EngineConfig {
    /// Checks the settings for values that would make the engine miss events
    /// or spin.
    ///
    /// # Errors
    ///
    /// Returns an error if a duration is zero or above
    /// [`MAX_DURATION_SECONDS`], or the sweep cadence is longer than the
    /// bucket window.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("bucket_window_seconds", self.bucket_window_seconds),
            ("lock_timeout_seconds", self.lock_timeout_seconds),
            ("lock_poll_interval_seconds", self.lock_poll_interval_seconds),
            ("sweep_interval_seconds", self.sweep_interval_seconds),
        ];
        if let Some((setting, _)) = durations.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroDuration { setting: *setting });
        }
        let bounded = [
            ("bucket_window_seconds", self.bucket_window_seconds),
            ("lock_timeout_seconds", self.lock_timeout_seconds),
            ("lock_poll_interval_seconds", self.lock_poll_interval_seconds),
            ("lock_wait_seconds", self.lock_wait_seconds),
            ("sweep_interval_seconds", self.sweep_interval_seconds),
            (
                "history_max_age_hours",
                self.history_max_age_hours.saturating_mul(3600),
            ),
        ];
        if let Some((setting, _)) = bounded
            .iter()
            .find(|(_, value)| *value > MAX_DURATION_SECONDS)
        {
            return Err(ConfigError::DurationTooLong {
                setting: *setting,
                max_seconds: MAX_DURATION_SECONDS,
            });
        }
        if self.sweep_interval_seconds > self.bucket_window_seconds {
            return Err(ConfigError::SweepSlowerThanWindow {
                sweep_interval_seconds: self.sweep_interval_seconds,
                bucket_window_seconds: self.bucket_window_seconds,
            });
        }
        Ok(())
    }

    /// Sets the operator.
    #[must_use]
    pub fn with_operator(mut self, operator: ActorId) -> Self {
        self.operator_id = Some(operator);
        self
    }

    /// Sets the VIP list.
    #[must_use]
    pub fn with_vip_list(mut self, vips: Vec<ActorId>) -> Self {
        self.vip_list = vips;
        self
    }

    /// Width of a time bucket.
    #[must_use]
    pub fn bucket_window(&self) -> chrono::Duration {
        seconds(self.bucket_window_seconds)
    }

    /// Age after which a held lock is stale.
    #[must_use]
    pub fn lock_timeout(&self) -> chrono::Duration {
        seconds(self.lock_timeout_seconds)
    }

    /// Delay between lock attempts.
    #[must_use]
    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_secs(self.lock_poll_interval_seconds)
    }

    /// Ceiling on the lock wait.
    #[must_use]
    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_seconds)
    }

    /// Cadence of the periodic sweep.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Oldest conversation entry kept in the prompt history.
    #[must_use]
    pub fn history_max_age(&self) -> chrono::Duration {
        seconds(self.history_max_age_hours.saturating_mul(3600))
    }

    /// Returns true if failures for this actor go to the operator.
    #[must_use]
    pub fn is_vip(&self, actor: &ActorId) -> bool {
        self.vip_list.contains(actor)
    }

    /// Returns true if this actor is the operator.
    #[must_use]
    pub fn is_operator(&self, actor: &ActorId) -> bool {
        self.operator_id.as_ref() == Some(actor)
    }
}
