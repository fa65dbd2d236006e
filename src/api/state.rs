//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::websocket::{ConnectionRegistry, RegistryConfig};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Registry of connected boxes
    pub registry: Arc<ConnectionRegistry>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState with a fresh registry
    pub fn new(config: ApiConfig, registry_config: RegistryConfig) -> Self {
        Self::with_registry(config, Arc::new(ConnectionRegistry::new(registry_config)))
    }

    /// Create AppState around an existing registry
    pub fn with_registry(config: ApiConfig, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Text of the greeting sent to each box
    pub welcome_message: String,
    /// Outbound queue capacity per connection
    pub outbound_buffer: usize,
    /// Box targeted by commands without a `box_id`
    pub default_box_id: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            welcome_message: "Welcome!".to_string(),
            outbound_buffer: 32,
            default_box_id: "001".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
