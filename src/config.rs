//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::ApiConfig;
use crate::websocket::RegistryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Relay behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Text of the greeting sent on connect
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,

    /// Upper bound for one write to one box
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    /// Frames queued per connection before writers wait
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Box targeted by commands that do not name one
    #[serde(default = "default_box_id")]
    pub default_box_id: String,

    /// Deliver commands only to boxes that announced the matching id
    #[serde(default)]
    pub filter_by_target: bool,
}

fn default_welcome_message() -> String {
    "Welcome!".to_string()
}

fn default_write_timeout() -> u64 {
    5000 // 5 seconds
}

fn default_outbound_buffer() -> usize {
    32
}

fn default_box_id() -> String {
    "001".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            welcome_message: default_welcome_message(),
            write_timeout_ms: default_write_timeout(),
            outbound_buffer: default_outbound_buffer(),
            default_box_id: default_box_id(),
            filter_by_target: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("box-relay").join("config.toml")),
            Some(PathBuf::from("/etc/box-relay/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(host) = lookup("BOX_RELAY_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("BOX_RELAY_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        // Relay overrides
        if let Some(ms) = lookup("BOX_RELAY_WRITE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.relay.write_timeout_ms = ms;
        }
        if let Some(box_id) = lookup("BOX_RELAY_DEFAULT_BOX_ID") {
            self.relay.default_box_id = box_id;
        }
        if let Some(filter) = lookup("BOX_RELAY_FILTER_BY_TARGET") {
            self.relay.filter_by_target = parse_flag(&filter);
        }

        // Logging overrides
        if let Some(level) = lookup("BOX_RELAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("BOX_RELAY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Registry settings derived from this config
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            write_timeout: Duration::from_millis(self.relay.write_timeout_ms),
            filter_by_target: self.relay.filter_by_target,
        }
    }

    /// HTTP/WebSocket server settings derived from this config
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            welcome_message: self.relay.welcome_message.clone(),
            outbound_buffer: self.relay.outbound_buffer,
            default_box_id: self.relay.default_box_id.clone(),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Box Relay Configuration
#
# Environment variables override these settings:
# - BOX_RELAY_HOST
# - BOX_RELAY_PORT
# - BOX_RELAY_WRITE_TIMEOUT_MS
# - BOX_RELAY_DEFAULT_BOX_ID
# - BOX_RELAY_FILTER_BY_TARGET
# - BOX_RELAY_LOG_LEVEL
# - BOX_RELAY_LOG_FORMAT

[server]
# Listen address for both WebSocket and HTTP API
host = "0.0.0.0"
port = 8080

[relay]
# Greeting sent to every box on connect, as {"message": "..."}
welcome_message = "Welcome!"

# Maximum time a single write to one box may take (ms)
write_timeout_ms = 5000

# Frames queued per connection
outbound_buffer = 32

# Box targeted by commands that do not name one
default_box_id = "001"

# Only deliver commands to boxes that announced a matching box_id.
# When false every connected box receives every command.
filter_by_target = false

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
