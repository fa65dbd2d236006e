//! WebSocket Relay
//!
//! Accepts box connections and fans commands out to them.
//!
//! ## Architecture
//!
//! - **ConnectionRegistry**: The set of open connections; register, deregister, broadcast
//! - **Connection**: One accepted session with a bounded, acknowledged outbound queue
//! - **Handler**: WebSocket upgrade, welcome, reader and writer tasks
//! - **Messages**: Payloads, box commands and lifecycle events
//! - **MessageHook**: Pluggable handling of inbound frames
//!
//! ## Usage
//!
//! Boxes connect to `/` (or `/ws`) and are greeted with
//! `{"message":"Welcome!"}`. Commands are broadcast as flat JSON objects:
//!
//! ```text
//! {"box_id":"001","cmd":"restartesp"}
//! ```
//!
//! A box may announce itself by sending any JSON object carrying a
//! `box_id` string; targeted broadcasts use that when filtering is enabled.

mod connection;
mod handler;
mod hook;
mod messages;
mod registry;

pub use connection::{
    Connection, ConnectionId, ConnectionInfo, Outbound, WriteError, WriteErrorKind,
};
pub use handler::websocket_handler;
pub use hook::{LoggingHook, MessageHook};
pub use messages::{BoxCommand, CloseReason, ConnectionEvent, Payload, WelcomeMessage};
pub use registry::{BroadcastResult, ConnectionRegistry, DeliveryFailure, RegistryConfig};
