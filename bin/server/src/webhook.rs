//! WhatsApp Cloud API webhook payloads.
//!
//! Only the fields the message pipeline needs are modelled. Delivery status
//! callbacks arrive on the same endpoint and carry no messages, so they
//! parse to an empty list.

use chime_core::{ActorId, MessageId};
use chime_inbound::{InboundMessage, MessageBody};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Top-level webhook notification.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

/// One message as the Cloud API sends it.
#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub from: String,
    pub id: String,
    /// Unix seconds, as a string.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<WireText>,
    #[serde(default)]
    pub button: Option<WireButton>,
}

#[derive(Debug, Deserialize)]
pub struct WireText {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct WireButton {
    pub payload: String,
}

impl WireMessage {
    fn into_inbound(self, received_at: DateTime<Utc>) -> Option<InboundMessage> {
        let actor_id = self.from.parse::<ActorId>().ok()?;
        let message_id = self.id.parse::<MessageId>().ok()?;
        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or(received_at);

        let body = match (self.kind.as_str(), self.text, self.button) {
            ("text", Some(text), _) => MessageBody::Text(text.body),
            ("button", _, Some(button)) => MessageBody::Button {
                payload: button.payload,
            },
            ("audio", _, _) => MessageBody::Audio,
            (kind, _, _) => MessageBody::Unsupported {
                kind: kind.to_string(),
            },
        };

        Some(InboundMessage {
            actor_id,
            message_id,
            timestamp,
            body,
        })
    }
}

impl Envelope {
    /// Extracts every message in the notification, in order.
    ///
    /// Messages without a usable sender or id are skipped. A missing or
    /// malformed timestamp falls back to `received_at`.
    #[must_use]
    pub fn into_messages(self, received_at: DateTime<Utc>) -> Vec<InboundMessage> {
        self.entry
            .into_iter()
            .flat_map(|entry| entry.changes)
            .flat_map(|change| change.value.messages)
            .filter_map(|message| message.into_inbound(received_at))
            .collect()
    }
}

/// Parses a webhook body into inbound messages.
///
/// # Errors
///
/// Returns an error if the body is not a Cloud API notification.
pub fn parse_envelope(
    body: serde_json::Value,
    received_at: DateTime<Utc>,
) -> Result<Vec<InboundMessage>, serde_json::Error> {
    let envelope: Envelope = serde_json::from_value(body)?;
    Ok(envelope.into_messages(received_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn received_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    fn envelope(messages: serde_json::Value) -> serde_json::Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "102290129340398",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "contacts": [{"profile": {"name": "Sam"}, "wa_id": "15550001111"}],
                        "messages": messages
                    }
                }]
            }]
        })
    }

    #[test]
    fn text_message_is_parsed() {
        let body = envelope(json!([{
            "from": "15550001111",
            "id": "wamid.HBgL",
            "timestamp": "1709542800",
            "type": "text",
            "text": {"body": "remind me to stretch at 5pm"}
        }]));

        let messages = parse_envelope(body, received_at()).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].actor_id, ActorId::new("15550001111"));
        assert_eq!(messages[0].message_id, MessageId::new("wamid.HBgL"));
        assert_eq!(
            messages[0].timestamp,
            DateTime::from_timestamp(1_709_542_800, 0).unwrap()
        );
        assert_eq!(
            messages[0].body,
            MessageBody::Text("remind me to stretch at 5pm".to_string())
        );
    }

    #[test]
    fn button_audio_and_other_kinds() {
        let body = envelope(json!([
            {"from": "15550001111", "id": "a", "type": "button",
             "button": {"payload": "I consent", "text": "I consent"}},
            {"from": "15550001111", "id": "b", "type": "audio", "audio": {"id": "x"}},
            {"from": "15550001111", "id": "c", "type": "sticker", "sticker": {"id": "y"}}
        ]));

        let bodies: Vec<MessageBody> = parse_envelope(body, received_at())
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();

        assert_eq!(
            bodies,
            vec![
                MessageBody::Button {
                    payload: "I consent".to_string()
                },
                MessageBody::Audio,
                MessageBody::Unsupported {
                    kind: "sticker".to_string()
                },
            ]
        );
    }

    #[test]
    fn status_callback_has_no_messages() {
        let body = json!({
            "object": "whatsapp_business_account",
            "entry": [{"changes": [{"value": {
                "statuses": [{"id": "wamid.HBgL", "status": "delivered"}]
            }}]}]
        });
        assert!(parse_envelope(body, received_at()).unwrap().is_empty());
    }

    #[test]
    fn missing_timestamp_falls_back_and_blank_sender_is_skipped() {
        let body = envelope(json!([
            {"from": "15550001111", "id": "a", "type": "text", "text": {"body": "hi"}},
            {"from": " ", "id": "b", "type": "text", "text": {"body": "hi"}}
        ]));
        let messages = parse_envelope(body, received_at()).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].timestamp, received_at());
    }

    #[test]
    fn non_envelope_is_rejected() {
        assert!(parse_envelope(json!(["not", "an", "envelope"]), received_at()).is_err());
    }
}
