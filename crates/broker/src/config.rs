//! Broker configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::channels::DEFAULT_CHANNEL_ID;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("'{field}' must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("system channel id '{0}' is reserved or duplicated")]
    BadChannelId(String),
}

/// Timeouts and channel set for a broker instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrokerConfig {
    /// Grace period after a window connects during which handshake
    /// deadlines are extended.
    pub maturity_ms: u64,

    /// Maximum time to wait for an application launch.
    pub launch_timeout_ms: u64,

    /// Time allowed for a mature application to register an intent or
    /// context listener.
    pub add_listener_timeout_ms: u64,

    /// Maximum time one window may take to run its intent handlers.
    pub handler_timeout_ms: u64,

    /// Read-modify-write attempts for preference updates.
    pub preference_write_attempts: usize,

    /// Fixed system channels, in display order.
    pub system_channels: Vec<SystemChannelConfig>,
}

/// A system channel and how selectors should draw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemChannelConfig {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub glyph: Option<String>,
}

impl SystemChannelConfig {
    fn colour(id: &str, name: &str, color: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            color: color.to_string(),
            glyph: None,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            maturity_ms: 5_000,
            launch_timeout_ms: 30_000,
            add_listener_timeout_ms: 5_000,
            handler_timeout_ms: 15_000,
            preference_write_attempts: switchboard_storage::DEFAULT_WRITE_ATTEMPTS,
            system_channels: vec![
                SystemChannelConfig::colour("red", "Red", "#FF0000"),
                SystemChannelConfig::colour("orange", "Orange", "#FF8000"),
                SystemChannelConfig::colour("yellow", "Yellow", "#FFFF00"),
                SystemChannelConfig::colour("green", "Green", "#00FF00"),
                SystemChannelConfig::colour("blue", "Blue", "#0000FF"),
                SystemChannelConfig::colour("purple", "Purple", "#FF00FF"),
            ],
        }
    }
}

impl BrokerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("maturityMs", self.maturity_ms),
            ("launchTimeoutMs", self.launch_timeout_ms),
            ("addListenerTimeoutMs", self.add_listener_timeout_ms),
            ("handlerTimeoutMs", self.handler_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDuration { field });
            }
        }

        let mut seen = HashSet::new();
        for channel in &self.system_channels {
            if channel.id.trim().is_empty()
                || channel.id == DEFAULT_CHANNEL_ID
                || !seen.insert(channel.id.as_str())
            {
                return Err(ConfigError::BadChannelId(channel.id.clone()));
            }
        }
        Ok(())
    }

    pub fn maturity(&self) -> Duration {
        Duration::from_millis(self.maturity_ms)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    pub fn add_listener_timeout(&self) -> Duration {
        Duration::from_millis(self.add_listener_timeout_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}
