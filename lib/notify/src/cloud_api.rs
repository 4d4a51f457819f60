//! WhatsApp Business Cloud API notifier.

use crate::error::NotifyError;
use crate::notifier::{Notifier, Template};
use async_trait::async_trait;
use chime_core::ActorId;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, instrument};

/// Cloud API connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudApiConfig {
    /// Bearer token of the business app.
    pub access_token: String,
    /// Sending phone number id.
    pub phone_number_id: String,
    /// Token expected during webhook verification.
    #[serde(default)]
    pub verify_token: String,
    /// Graph API version segment.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Graph API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_api_version() -> String {
    "v16.0".to_string()
}

fn default_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

impl CloudApiConfig {
    /// Returns the messages endpoint for the configured phone number.
    #[must_use]
    pub fn messages_url(&self) -> String {
        format!(
            "{}/{}/{}/messages",
            self.base_url.trim_end_matches('/'),
            self.api_version,
            self.phone_number_id
        )
    }
}

/// Sends messages through the Cloud API.
#[derive(Debug, Clone)]
pub struct CloudApiNotifier {
    config: CloudApiConfig,
    client: reqwest::Client,
}

impl CloudApiNotifier {
    /// Creates a notifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the token or phone number id is empty.
    pub fn new(config: CloudApiConfig) -> Result<Self, NotifyError> {
        if config.access_token.is_empty() {
            return Err(NotifyError::InvalidConfig {
                reason: "access_token not configured".to_string(),
            });
        }
        if config.phone_number_id.is_empty() {
            return Err(NotifyError::InvalidConfig {
                reason: "phone_number_id not configured".to_string(),
            });
        }
        Ok(Self {
            config,
            client: reqwest::Client::new(),
        })
    }

    async fn post(&self, body: JsonValue) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.config.messages_url())
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(status = status.as_u16(), "message accepted");
        Ok(())
    }
}

fn text_payload(recipient: &ActorId, body: &str) -> JsonValue {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": recipient.as_str(),
        "type": "text",
        "text": { "body": body }
    })
}

fn template_payload(recipient: &ActorId, template: &Template, params: &[String]) -> JsonValue {
    let parameters: Vec<JsonValue> = params
        .iter()
        .map(|text| json!({ "type": "text", "text": text }))
        .collect();
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": recipient.as_str(),
        "type": "template",
        "template": {
            "name": template.name,
            "language": { "code": template.locale },
            "components": [{ "type": "body", "parameters": parameters }]
        }
    })
}

#[async_trait]
impl Notifier for CloudApiNotifier {
    #[instrument(skip(self, body), fields(recipient = %recipient))]
    async fn send_text(&self, recipient: &ActorId, body: &str) -> Result<(), NotifyError> {
        self.post(text_payload(recipient, body)).await
    }

    #[instrument(skip(self, params), fields(recipient = %recipient, template = %template.name))]
    async fn send_template(
        &self,
        recipient: &ActorId,
        template: &Template,
        params: &[String],
    ) -> Result<(), NotifyError> {
        self.post(template_payload(recipient, template, params)).await
    }
}
