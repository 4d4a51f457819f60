//! Notifier trait and in-process implementations.

use crate::error::NotifyError;
use async_trait::async_trait;
use chime_core::ActorId;
use std::sync::{Arc, Mutex, PoisonError};

/// A pre-approved message template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Template name as registered with the channel.
    pub name: String,
    /// Locale code.
    pub locale: String,
}

impl Template {
    /// Creates a template reference.
    #[must_use]
    pub fn new(name: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locale: locale.into(),
        }
    }

    /// Template used to deliver a reminder; its single parameter is the text.
    #[must_use]
    pub fn reminder() -> Self {
        Self::new("reminders_message", "en_US")
    }

    /// Template asking for messaging consent; its single parameter is the
    /// support contact.
    #[must_use]
    pub fn opt_in() -> Self {
        Self::new("opt_in", "en")
    }
}

/// Outbound messaging channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends free text.
    async fn send_text(&self, recipient: &ActorId, body: &str) -> Result<(), NotifyError>;

    /// Sends a template with positional body parameters.
    async fn send_template(
        &self,
        recipient: &ActorId,
        template: &Template,
        params: &[String],
    ) -> Result<(), NotifyError>;
}

/// Wraps a notifier and drops every message when messaging is disabled.
pub struct GatedNotifier {
    inner: Arc<dyn Notifier>,
    enabled: bool,
}

impl GatedNotifier {
    /// Creates a gate around `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Notifier>, enabled: bool) -> Self {
        Self { inner, enabled }
    }
}

#[async_trait]
impl Notifier for GatedNotifier {
    async fn send_text(&self, recipient: &ActorId, body: &str) -> Result<(), NotifyError> {
        if !self.enabled {
            tracing::info!(recipient = %recipient, body, "messaging disabled, text not sent");
            return Ok(());
        }
        self.inner.send_text(recipient, body).await
    }

    async fn send_template(
        &self,
        recipient: &ActorId,
        template: &Template,
        params: &[String],
    ) -> Result<(), NotifyError> {
        if !self.enabled {
            tracing::info!(
                recipient = %recipient,
                template = %template.name,
                "messaging disabled, template not sent"
            );
            return Ok(());
        }
        self.inner.send_template(recipient, template, params).await
    }
}

/// A message captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Free text.
    Text { recipient: ActorId, body: String },
    /// Template.
    Template {
        recipient: ActorId,
        template: Template,
        params: Vec<String>,
    },
}

impl OutboundMessage {
    /// Returns the recipient.
    #[must_use]
    pub fn recipient(&self) -> &ActorId {
        match self {
            Self::Text { recipient, .. } | Self::Template { recipient, .. } => recipient,
        }
    }
}

/// Notifier that records messages instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes later sends fail after being recorded.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(PoisonError::into_inner) = failing;
    }

    /// Returns every recorded message in send order.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the bodies of recorded text messages.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|message| match message {
                OutboundMessage::Text { body, .. } => Some(body),
                OutboundMessage::Template { .. } => None,
            })
            .collect()
    }

    fn record(&self, message: OutboundMessage) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        if *self.failing.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(NotifyError::ConnectionFailed {
                reason: "recording notifier set to fail".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_text(&self, recipient: &ActorId, body: &str) -> Result<(), NotifyError> {
        self.record(OutboundMessage::Text {
            recipient: recipient.clone(),
            body: body.to_string(),
        })
    }

    async fn send_template(
        &self,
        recipient: &ActorId,
        template: &Template,
        params: &[String],
    ) -> Result<(), NotifyError> {
        self.record(OutboundMessage::Template {
            recipient: recipient.clone(),
            template: template.clone(),
            params: params.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gate_drops_when_disabled() {
        let recorder = RecordingNotifier::new();
        let gate = GatedNotifier::new(Arc::new(recorder.clone()), false);
        gate.send_text(&ActorId::new("1"), "hi").await.unwrap();
        gate.send_template(&ActorId::new("1"), &Template::reminder(), &["x".to_string()])
            .await
            .unwrap();
        assert!(recorder.sent().is_empty());
    }

    #[tokio::test]
    async fn gate_forwards_when_enabled() {
        let recorder = RecordingNotifier::new();
        let gate = GatedNotifier::new(Arc::new(recorder.clone()), true);
        gate.send_text(&ActorId::new("1"), "hi").await.unwrap();
        assert_eq!(recorder.texts(), vec!["hi".to_string()]);
        assert_eq!(recorder.sent()[0].recipient(), &ActorId::new("1"));
    }

    #[tokio::test]
    async fn failing_recorder_still_records() {
        let recorder = RecordingNotifier::new();
        recorder.set_failing(true);
        let result = recorder.send_text(&ActorId::new("1"), "hi").await;
        assert!(result.is_err());
        assert_eq!(recorder.sent().len(), 1);
    }
}
