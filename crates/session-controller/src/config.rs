//! Session Controller configuration.
//!
//! Configuration is loaded from environment variables. The database URL is
//! redacted in Debug output.

use common::config::{ObservabilityConfig, DEFAULT_LOG_FILTER};
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default meeting provider base URL.
pub const DEFAULT_MEETING_PROVIDER_URL: &str = "http://localhost:8090";

/// Default credential verification endpoint.
pub const DEFAULT_AUTH_VERIFY_URL: &str = "http://localhost:8082/internal/verify";

/// Default provider request timeout in seconds.
pub const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 10;

/// Upper bound for the provider request timeout.
pub const MAX_PROVIDER_TIMEOUT_SECONDS: u64 = 60;

/// Default per-connection outbound queue length.
pub const DEFAULT_ROOM_OUTBOUND_BUFFER: usize = 256;

/// Default maximum length of chat, question and answer bodies.
pub const DEFAULT_CHAT_MAX_LENGTH: usize = 2000;

/// Default graceful shutdown drain in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 5;

/// Session Controller configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL. `None` selects the in-memory store.
    pub database_url: Option<String>,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Base URL of the meeting provider REST API.
    pub meeting_provider_url: String,

    /// Timeout applied to every provider request.
    pub provider_timeout_seconds: u64,

    /// Endpoint that verifies bearer credentials and returns `{user_id, role}`.
    pub auth_verify_url: String,

    /// Outbound queue length per real-time connection.
    pub room_outbound_buffer: usize,

    /// Maximum accepted length of chat, question and answer bodies.
    pub chat_max_length: usize,

    /// Seconds to wait for in-flight requests on shutdown.
    pub drain_seconds: u64,

    /// Logging configuration.
    pub observability: ObservabilityConfig,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("bind_address", &self.bind_address)
            .field("meeting_provider_url", &self.meeting_provider_url)
            .field("provider_timeout_seconds", &self.provider_timeout_seconds)
            .field("auth_verify_url", &self.auth_verify_url)
            .field("room_outbound_buffer", &self.room_outbound_buffer)
            .field("chat_max_length", &self.chat_max_length)
            .field("drain_seconds", &self.drain_seconds)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider timeout configuration: {0}")]
    InvalidProviderTimeout(String),

    #[error("Invalid room buffer configuration: {0}")]
    InvalidRoomBuffer(String),

    #[error("Invalid chat length configuration: {0}")]
    InvalidChatLength(String),

    #[error("Invalid drain configuration: {0}")]
    InvalidDrain(String),

    #[error("Invalid log format: {0}")]
    InvalidLogFormat(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .cloned();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let meeting_provider_url = vars
            .get("MEETING_PROVIDER_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_MEETING_PROVIDER_URL.to_string());

        let auth_verify_url = vars
            .get("AUTH_VERIFY_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_AUTH_VERIFY_URL.to_string());

        let provider_timeout_seconds =
            if let Some(value_str) = vars.get("PROVIDER_TIMEOUT_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidProviderTimeout(format!(
                        "PROVIDER_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 || value > MAX_PROVIDER_TIMEOUT_SECONDS {
                    return Err(ConfigError::InvalidProviderTimeout(format!(
                        "PROVIDER_TIMEOUT_SECONDS must be between 1 and {}, got {}",
                        MAX_PROVIDER_TIMEOUT_SECONDS, value
                    )));
                }

                value
            } else {
                DEFAULT_PROVIDER_TIMEOUT_SECONDS
            };

        let room_outbound_buffer = if let Some(value_str) = vars.get("ROOM_OUTBOUND_BUFFER") {
            let value: usize = value_str.parse().map_err(|e| {
                ConfigError::InvalidRoomBuffer(format!(
                    "ROOM_OUTBOUND_BUFFER must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidRoomBuffer(
                    "ROOM_OUTBOUND_BUFFER must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_ROOM_OUTBOUND_BUFFER
        };

        let chat_max_length = if let Some(value_str) = vars.get("CHAT_MAX_LENGTH") {
            let value: usize = value_str.parse().map_err(|e| {
                ConfigError::InvalidChatLength(format!(
                    "CHAT_MAX_LENGTH must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidChatLength(
                    "CHAT_MAX_LENGTH must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_CHAT_MAX_LENGTH
        };

        let drain_seconds = match vars.get("DRAIN_SECONDS") {
            Some(value_str) => value_str.parse().map_err(|e| {
                ConfigError::InvalidDrain(format!(
                    "DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?,
            None => DEFAULT_DRAIN_SECONDS,
        };

        let json_logs = match vars.get("LOG_FORMAT").map(String::as_str) {
            None | Some("text") => false,
            Some("json") => true,
            Some(other) => {
                return Err(ConfigError::InvalidLogFormat(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{}'",
                    other
                )))
            }
        };

        let log_level = vars
            .get("RUST_LOG")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Config {
            database_url,
            bind_address,
            meeting_provider_url,
            provider_timeout_seconds,
            auth_verify_url,
            room_outbound_buffer,
            chat_max_length,
            drain_seconds,
            observability: ObservabilityConfig {
                log_level,
                json_logs,
            },
        })
    }
}
