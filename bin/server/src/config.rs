//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested keys
//! use `__`, so `ENGINE__LOCK_WAIT_SECONDS=30` sets
//! [`EngineConfig::lock_wait_seconds`] and `ENGINE__VIP_LIST=1555,1556`
//! sets the VIP list.

use chime_ai::OpenAiConfig;
use chime_core::EngineConfig;
use chime_notify::CloudApiConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Maximum connections in the database pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Engine settings shared by the sweep and the message pipeline.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Chat-completion provider.
    pub llm: OpenAiConfig,

    /// WhatsApp Cloud API.
    pub cloud_api: CloudApiConfig,

    /// Address users can write to about their data.
    #[serde(default)]
    pub support_contact: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::default())
    }

    fn from_source(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                source
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("engine.vip_list"),
            )
            .build()?
            .try_deserialize()
    }
}
