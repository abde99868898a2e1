//! Configuration management for the ClipSync client
//!
//! This module handles loading, validating, and managing configuration
//! for the client.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::transport::{ReconnectionConfig, WebSocketConfig, DEFAULT_PORT};

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV_VAR: &str = "CLIPSYNC_CLIENT_CONFIG";

/// Upper bound for connection timeouts and keep-alive intervals (1 hour)
const MAX_INTERVAL_SECS: u64 = 3_600;

/// Upper bound for retry delays (1 hour)
const MAX_RETRY_DELAY_MS: u64 = 3_600_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML rendering error
    #[error("Failed to render TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Validation error
    #[error("Config validation failed: {0}")]
    Validation(String),

    /// Connect requested without a paired computer
    #[error("CS012: No paired computer. Scan the pairing code or run 'clipsync-client connect <host>'.")]
    MissingEndpoint,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Retry policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Clipboard configuration
    #[serde(default)]
    pub clipboard: ClipboardConfig,

    /// File holding the last paired host
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Port the paired computer listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds allowed for opening a session
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Seconds between keep-alive pings
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,

    /// Connect to the saved host on startup
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default)]
    pub jitter_factor: f64,

    /// Consecutive retries before giving up (0 = never give up)
    #[serde(default)]
    pub max_attempts: u32,
}

/// Clipboard configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipboardConfig {
    /// Maximum inbound payload size in bytes
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

// Default value functions
fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_keepalive_interval_secs() -> u64 {
    30
}

fn default_auto_connect() -> bool {
    true
}

fn default_initial_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_max_size() -> usize {
    5_242_880 // 5MB
}

fn default_state_file() -> PathBuf {
    PathBuf::from("~/.local/share/clipsync-client/endpoint.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            auto_connect: default_auto_connect(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            reconnect: ReconnectConfig::default(),
            clipboard: ClipboardConfig::default(),
            state_file: default_state_file(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Checks in order:
    /// 1. Path from CLIPSYNC_CLIENT_CONFIG environment variable
    /// 2. ~/.config/clipsync-client/config.toml
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_path() {
            Some(path) => Self::load_from_path(&path),
            None => {
                let mut config = Self::default();
                config.expand_paths();
                Ok(config)
            }
        }
    }

    /// Load configuration with an optional explicit path
    pub fn load_config(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(toml_str)?;
        config.expand_paths();
        config.validate_config()?;
        Ok(config)
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("clipsync-client").join("config.toml"))
    }

    fn find_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        Self::default_path().filter(|p| p.exists())
    }

    /// Expand tilde in paths
    fn expand_paths(&mut self) {
        self.state_file = expand_path(&self.state_file);
    }

    /// Validate configuration values
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        let connection = &self.connection;
        if connection.port == 0 {
            return Err(ConfigError::Validation("port must not be 0".to_string()));
        }
        if !(1..=MAX_INTERVAL_SECS).contains(&connection.connect_timeout_secs) {
            return Err(ConfigError::Validation(format!(
                "connect_timeout_secs must be between 1 and {}",
                MAX_INTERVAL_SECS
            )));
        }
        if !(1..=MAX_INTERVAL_SECS).contains(&connection.keepalive_interval_secs) {
            return Err(ConfigError::Validation(format!(
                "keepalive_interval_secs must be between 1 and {}",
                MAX_INTERVAL_SECS
            )));
        }

        let reconnect = &self.reconnect;
        if reconnect.initial_delay_ms < 1 {
            return Err(ConfigError::Validation(
                "initial_delay_ms must be at least 1".to_string(),
            ));
        }
        if reconnect.max_delay_ms < reconnect.initial_delay_ms {
            return Err(ConfigError::Validation(
                "max_delay_ms must not be below initial_delay_ms".to_string(),
            ));
        }
        if reconnect.max_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(ConfigError::Validation(format!(
                "max_delay_ms must not exceed {} (1 hour)",
                MAX_RETRY_DELAY_MS
            )));
        }
        if !(reconnect.backoff_multiplier >= 1.0) {
            return Err(ConfigError::Validation(
                "backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&reconnect.jitter_factor) {
            return Err(ConfigError::Validation(
                "jitter_factor must be between 0.0 and 1.0".to_string(),
            ));
        }

        // Validate max_size range (1KB to 50MB)
        if self.clipboard.max_size < 1024 {
            return Err(ConfigError::Validation(
                "max_size must be at least 1024 bytes (1KB)".to_string(),
            ));
        }
        if self.clipboard.max_size > 52_428_800 {
            return Err(ConfigError::Validation(
                "max_size must not exceed 52428800 bytes (50MB)".to_string(),
            ));
        }

        Ok(())
    }

    /// Session settings derived from this configuration
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            connect_timeout: Duration::from_secs(self.connection.connect_timeout_secs),
            keepalive_interval: Duration::from_secs(self.connection.keepalive_interval_secs),
        }
    }

    /// Retry policy derived from this configuration
    pub fn reconnection_config(&self) -> ReconnectionConfig {
        ReconnectionConfig {
            max_attempts: self.reconnect.max_attempts,
            initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            backoff_multiplier: self.reconnect.backoff_multiplier,
            jitter_factor: self.reconnect.jitter_factor,
        }
    }

    /// Save configuration to the given path, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Write the commented example configuration to `path`
    pub fn write_example(path: &Path, force: bool) -> Result<(), ConfigError> {
        if !force && path.exists() {
            return Err(ConfigError::Validation(
                "Config file already exists. Use --force to overwrite.".to_string(),
            ));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::generate_example())?;
        Ok(())
    }

    /// Generate example configuration file
    pub fn generate_example() -> String {
        let config = Config::default();

        format!(
            r#"# ClipSync Client Configuration File
# Location: ~/.config/clipsync-client/config.toml

# File remembering the last paired computer
state_file = "{}"

# Logging level (trace, debug, info, warn, error)
log_level = "{}"

[connection]
# Port the paired computer listens on (plain ws://, no TLS)
port = {}
# Seconds allowed to open a connection
connect_timeout_secs = {}
# Seconds between keep-alive pings; a missed pong drops the connection
keepalive_interval_secs = {}
# Connect to the saved computer on startup
auto_connect = {}

[reconnect]
# Delay before retrying after a failure
initial_delay_ms = {}
# Upper bound on the retry delay
max_delay_ms = {}
# Delay growth per consecutive failure (1.0 = fixed delay)
backoff_multiplier = {:.1}
# Random spread applied to each delay (0.0 - 1.0)
jitter_factor = {:.1}
# Consecutive retries before giving up (0 = never give up)
max_attempts = {}

[clipboard]
# Largest inbound clipboard update accepted, in bytes (5MB default)
max_size = {}
"#,
            config.state_file.display(),
            config.log_level,
            config.connection.port,
            config.connection.connect_timeout_secs,
            config.connection.keepalive_interval_secs,
            config.connection.auto_connect,
            config.reconnect.initial_delay_ms,
            config.reconnect.max_delay_ms,
            config.reconnect.backoff_multiplier,
            config.reconnect.jitter_factor,
            config.reconnect.max_attempts,
            config.clipboard.max_size,
        )
    }
}

/// Expand tilde in path
fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(path_str.as_ref());
    PathBuf::from(expanded.into_owned())
}
