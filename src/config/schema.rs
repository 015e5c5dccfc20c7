//! Configuration schema definitions.
//!
//! All sections deserialize with defaults, so a config file only needs the
//! keys it wants to change.

use super::error::{ConfigError, ConfigResult};
use crate::port::{BaudRate, DEFAULT_CHUNK_SIZE, DEFAULT_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port defaults
    pub serial: SerialConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check values that parse fine but make no sense.
    pub fn validate(&self) -> ConfigResult<()> {
        self.serial.validate()
    }
}

/// Serial port configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate used when none is given on the command line
    pub default_baud: BaudRate,
    /// Read timeout in milliseconds; absent means reads never wait
    pub default_timeout_ms: Option<u64>,
    /// Bytes requested from the driver per refill
    pub chunk_size: usize,
    /// Short names for device paths
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            default_baud: BaudRate::default(),
            default_timeout_ms: Some(DEFAULT_TIMEOUT.as_millis() as u64),
            chunk_size: DEFAULT_CHUNK_SIZE,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    /// The read timeout as a Duration
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.chunk_size == 0 {
            return Err(ConfigError::validation(
                "serial.chunk_size",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive: "trace", "debug", "info", "warn", "error", or a full
    /// `tracing_subscriber::EnvFilter` string
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
