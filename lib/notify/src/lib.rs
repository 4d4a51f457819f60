//! Outbound messaging for the chime reminder engine.
//!
//! This crate provides:
//!
//! - **Notifier trait**: Free-text and templated messages to one recipient
//! - **Cloud API notifier**: WhatsApp Business Cloud API over HTTPS
//! - **Gated notifier**: Honours the `messaging_enabled` switch
//! - **Recording notifier**: Captures messages for tests

pub mod cloud_api;
pub mod error;
pub mod notifier;

pub use cloud_api::{CloudApiConfig, CloudApiNotifier};
pub use error::NotifyError;
pub use notifier::{GatedNotifier, Notifier, OutboundMessage, RecordingNotifier, Template};
