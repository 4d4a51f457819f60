//! Error types for server startup.
//!
//! Request handling never fails past the HTTP boundary: the webhook always
//! answers 200 and per-message failures are handled by the message
//! processor. Only startup and the listener surface errors here.

use std::fmt;

/// Errors that stop the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration is invalid.
    Config { reason: String },
    /// The database pool could not be created.
    Database { reason: String },
    /// Migrations could not be applied.
    Migration { reason: String },
    /// An outbound client (chat model, Cloud API) could not be built.
    Client { service: &'static str, reason: String },
    /// The listener could not bind its address.
    Bind { addr: String, reason: String },
    /// The HTTP server stopped with an error.
    Serve { reason: String },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Self::Database { reason } => write!(f, "database connection failed: {reason}"),
            Self::Migration { reason } => write!(f, "migrations failed: {reason}"),
            Self::Client { service, reason } => {
                write!(f, "failed to build {service} client: {reason}")
            }
            Self::Bind { addr, reason } => write!(f, "failed to bind {addr}: {reason}"),
            Self::Serve { reason } => write!(f, "server error: {reason}"),
        }
    }
}

impl std::error::Error for ServerError {}
