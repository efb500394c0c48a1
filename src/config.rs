//! Engine configuration module
//! Handles dynamic configuration parameters for the presence engine and server

use crate::auth::role::Role;
use crate::constants::{
    DEFAULT_HOST, DEFAULT_MAX_MESSAGE_LENGTH, DEFAULT_PORT, DEFAULT_TYPING_TIMEOUT_SECS,
};
use std::env;
use std::time::Duration;

/// Engine and server configuration parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    /// Inactivity window after which a typing indicator auto-expires
    pub typing_timeout: Duration,
    /// Maximum accepted chat message length, in characters
    pub max_message_length: usize,
    /// Minimum role allowed to subscribe to a rider's live location
    pub min_tracking_role: Role,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            typing_timeout: Duration::from_secs(DEFAULT_TYPING_TIMEOUT_SECS),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            min_tracking_role: Role::Police,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables if available
    pub fn from_env() -> Self {
        let host = env::var("RIDE_RELAY_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = env::var("RIDE_RELAY_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let typing_timeout_ms = env::var("RIDE_RELAY_TYPING_TIMEOUT_MS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_TYPING_TIMEOUT_SECS * 1000);

        let max_message_length = env::var("RIDE_RELAY_MAX_MESSAGE_LENGTH")
            .ok()
            .and_then(|l| l.parse().ok())
            .unwrap_or(DEFAULT_MAX_MESSAGE_LENGTH);

        let min_tracking_role = env::var("RIDE_RELAY_MIN_TRACKING_ROLE")
            .ok()
            .and_then(|r| Role::from_str(&r))
            .unwrap_or(Role::Police);

        Self {
            host,
            port,
            typing_timeout: Duration::from_millis(typing_timeout_ms),
            max_message_length,
            min_tracking_role,
        }
    }
}
