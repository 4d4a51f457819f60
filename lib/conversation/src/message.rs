//! Conversation log entries.

use chime_core::{EntryId, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The actor.
    User,
    /// The assistant, including synthetic reminder entries.
    Assistant,
}

/// What part of the pipeline produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Ordinary chat turn.
    Chat,
    /// Onboarding exchange (name, timezone).
    Setup,
    /// The assistant's request for a change to the actor's reminders.
    Request,
    /// Command text written for a request. Hidden from later chat turns.
    Command,
    /// A reminder delivered by the sweep.
    Reminder,
    /// Apology sent after a failure.
    Error,
}

/// One entry in an actor's conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique entry identifier.
    pub id: EntryId,
    /// Author.
    pub role: Role,
    /// Producing stage.
    pub kind: EntryKind,
    /// Entry text.
    pub text: String,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    /// Channel message id of the inbound message, for user entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

impl LogEntry {
    /// Creates a chat entry.
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::new(),
            role,
            kind: EntryKind::Chat,
            text: text.into(),
            timestamp,
            message_id: None,
        }
    }

    /// Creates a user entry.
    #[must_use]
    pub fn user(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::User, text, timestamp)
    }

    /// Creates an assistant entry.
    #[must_use]
    pub fn assistant(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::Assistant, text, timestamp)
    }

    /// Creates the audit entry written after a reminder is delivered.
    #[must_use]
    pub fn reminder(text: &str, timestamp: DateTime<Utc>) -> Self {
        Self::assistant(
            format!("Reminder!😊 \n{text}\nLet me know if you need anything else."),
            timestamp,
        )
        .with_kind(EntryKind::Reminder)
    }

    /// Sets the entry kind.
    #[must_use]
    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attaches the inbound channel message id.
    #[must_use]
    pub fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = Some(message_id);
        self
    }
}

/// Returns true if any entry in `log` carries `message_id`.
#[must_use]
pub fn contains_message(log: &[LogEntry], message_id: &MessageId) -> bool {
    log.iter()
        .any(|entry| entry.message_id.as_ref() == Some(message_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn reminder_entry_wraps_text() {
        let entry = LogEntry::reminder("Water the plants (every day)", at());
        assert_eq!(entry.role, Role::Assistant);
        assert_eq!(entry.kind, EntryKind::Reminder);
        assert_eq!(
            entry.text,
            "Reminder!😊 \nWater the plants (every day)\nLet me know if you need anything else."
        );
    }

    #[test]
    fn message_id_lookup() {
        let log = vec![
            LogEntry::user("hi", at()).with_message_id(MessageId::new("m1")),
            LogEntry::assistant("hello", at()),
        ];
        assert!(contains_message(&log, &MessageId::new("m1")));
        assert!(!contains_message(&log, &MessageId::new("m2")));
    }

    #[test]
    fn entry_serde_omits_missing_message_id() {
        let entry = LogEntry::assistant("ok", at());
        let json = serde_json::to_value(&entry).expect("serialize");
        assert!(json.get("message_id").is_none());
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["kind"], "chat");
    }
}
