//! # Configuration Management
//!
//! Centralized configuration for the protocol core.
//!
//! This module provides structured configuration for servers embedding the
//! protocol: listen parameters, session buffer sizing, codec settings, and
//! logging options.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-variable overrides via `from_env()`
//!
//! Buffer defaults follow the connection profile the core is built for:
//! a small default window (most packets are tiny) that doubles under burst
//! and walks back down after a cooldown.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

use crate::error::{ProtocolError, Result};
use crate::session::buffer::{DEFAULT_CAPACITY, SHRINK_COOLDOWN};
use crate::utils::compression::CompressionKind;

/// Main configuration structure containing all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProtocolConfig {
    /// Server listen configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-connection buffer configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Frame codec configuration
    #[serde(default)]
    pub codec: CodecConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ProtocolConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("ZONE_PROTOCOL_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(buffer) = std::env::var("ZONE_PROTOCOL_INITIAL_BUFFER_BYTES") {
            if let Ok(val) = buffer.parse::<usize>() {
                config.session.initial_buffer_bytes = val;
            }
        }

        if let Ok(cooldown) = std::env::var("ZONE_PROTOCOL_SHRINK_COOLDOWN_MS") {
            if let Ok(val) = cooldown.parse::<u64>() {
                config.session.shrink_cooldown = Duration::from_millis(val);
            }
        }

        if let Ok(floor) = std::env::var("ZONE_PROTOCOL_COMPRESSION_FLOOR_BYTES") {
            if let Ok(val) = floor.parse::<usize>() {
                config.codec.compression_floor_bytes = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.session.validate());
        errors.extend(self.codec.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server listen configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "127.0.0.1:44453")
    pub address: String,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:44453"),
            max_connections: 1000,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:44453')",
                self.address
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Per-connection buffer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Initial (and minimum) window size for a connection buffer
    pub initial_buffer_bytes: usize,

    /// How long occupancy must stay below a quarter of capacity before the
    /// window shrinks back toward the initial size
    #[serde(with = "duration_serde")]
    pub shrink_cooldown: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_buffer_bytes: DEFAULT_CAPACITY,
            shrink_cooldown: SHRINK_COOLDOWN,
        }
    }
}

impl SessionConfig {
    /// Validate session configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.initial_buffer_bytes < 16 {
            errors.push("Initial buffer too small (minimum: 16 bytes)".to_string());
        } else if self.initial_buffer_bytes > 1024 * 1024 {
            errors.push("Initial buffer too large (maximum: 1 MB)".to_string());
        }
        if !self.initial_buffer_bytes.is_power_of_two() {
            errors.push("Initial buffer should be a power of two (doubling growth)".to_string());
        }

        if self.shrink_cooldown.as_millis() < 10 {
            errors.push("Shrink cooldown too short (minimum: 10ms)".to_string());
        } else if self.shrink_cooldown.as_secs() > 60 {
            errors.push("Shrink cooldown too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Frame codec configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodecConfig {
    /// Compression algorithm for frame bodies
    pub compression: CompressionKind,

    /// Minimum body size (bytes) before compression is attempted
    /// Bodies smaller than this bypass compression to reduce overhead
    #[serde(default)]
    pub compression_floor_bytes: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            compression: CompressionKind::default(),
            compression_floor_bytes: crate::core::frame::COMPRESSION_FLOOR,
        }
    }
}

impl CodecConfig {
    /// Validate codec configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.compression_floor_bytes > 4096 {
            errors.push(format!(
                "Compression floor too large: {} bytes (maximum: 4096)",
                self.compression_floor_bytes
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("zone-protocol"),
            log_level: Level::INFO,
            log_to_console: true,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
