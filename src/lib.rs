//! # Box Relay
//!
//! WebSocket broadcast relay for embedded control boxes. Boxes connect,
//! get greeted, and receive JSON commands pushed through the HTTP API.
//!
//! ## Modules
//!
//! - [`websocket`]: Connection registry, broadcast and socket handling
//! - [`api`]: HTTP API and server with Axum
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use box_relay::{ApiConfig, AppState, BoxCommand, RegistryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = AppState::new(ApiConfig::default(), RegistryConfig::default());
//!     let registry = state.registry.clone();
//!
//!     // Push a command from anywhere in the process
//!     tokio::spawn(async move {
//!         let command = BoxCommand::cmd("001", "restartesp");
//!         if let Ok(result) = registry.broadcast_command(&command).await {
//!             println!("Delivered to {} boxes", result.delivered);
//!         }
//!     });
//!
//!     box_relay::serve(state).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod websocket;

pub use api::{build_router, serve, serve_with_shutdown, ApiConfig, ApiError, AppState};

pub use websocket::{
    websocket_handler, BoxCommand, BroadcastResult, CloseReason, Connection, ConnectionEvent,
    ConnectionId, ConnectionInfo, ConnectionRegistry, DeliveryFailure, LoggingHook, MessageHook,
    Payload, RegistryConfig, WelcomeMessage, WriteError, WriteErrorKind,
};

pub use config::{Config, ConfigError, LoggingConfig, RelayConfig, ServerConfig};
