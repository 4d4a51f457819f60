//! Prompt history window.

use crate::message::LogEntry;
use chime_core::EngineConfig;
use chrono::{DateTime, Duration, Utc};

/// Selects the recent part of a conversation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    max_entries: usize,
    max_age: Duration,
}

impl HistoryWindow {
    /// Creates a window keeping at most `max_entries` entries no older than
    /// `max_age`.
    #[must_use]
    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        Self {
            max_entries,
            max_age,
        }
    }

    /// Creates a window from the engine configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.history_max_entries, config.history_max_age())
    }

    /// Returns the selected entries, oldest first.
    #[must_use]
    pub fn select<'a>(&self, log: &'a [LogEntry], now: DateTime<Utc>) -> Vec<&'a LogEntry> {
        let cutoff = now.checked_sub_signed(self.max_age);
        let start = log.len().saturating_sub(self.max_entries);
        log[start..]
            .iter()
            .filter(|entry| cutoff.is_none_or(|cutoff| entry.timestamp >= cutoff))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 3, 12, 0, 0).unwrap()
    }

    #[test]
    fn keeps_only_last_entries() {
        let log: Vec<LogEntry> = (0..30)
            .map(|i| LogEntry::user(format!("m{i}"), now() - Duration::minutes(30 - i)))
            .collect();
        let window = HistoryWindow::new(20, Duration::hours(48));
        let selected = window.select(&log, now());
        assert_eq!(selected.len(), 20);
        assert_eq!(selected[0].text, "m10");
        assert_eq!(selected[19].text, "m29");
    }

    #[test]
    fn drops_entries_older_than_max_age() {
        let log = vec![
            LogEntry::user("old", now() - Duration::hours(49)),
            LogEntry::user("recent", now() - Duration::hours(1)),
        ];
        let window = HistoryWindow::from_config(&EngineConfig::default());
        let selected = window.select(&log, now());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].text, "recent");
    }
}
