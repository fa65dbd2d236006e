//! WebSocket Message Types
//!
//! Defines the payloads written to connected boxes and the events the
//! socket handler feeds into the registry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;

use super::connection::{Connection, ConnectionId};

/// Opaque payload written to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
}

impl Payload {
    /// Build a payload from raw bytes
    ///
    /// Valid UTF-8 becomes a text frame, anything else a binary frame.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Payload::Text(text),
            Err(e) => Payload::Binary(e.into_bytes()),
        }
    }

    /// Raw bytes of the payload
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text view, if this is a text frame
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

/// Greeting sent to every peer right after the upgrade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomeMessage {
    pub message: String,
}

impl WelcomeMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Serialize to a text payload
    pub fn to_payload(&self) -> Result<Payload, serde_json::Error> {
        serde_json::to_string(self).map(Payload::Text)
    }
}

impl Default for WelcomeMessage {
    fn default() -> Self {
        Self::new("Welcome!")
    }
}

/// Command addressed to a box
///
/// Serialized as a flat JSON object with `box_id` first, e.g.
/// `{"box_id":"001","cmd":"restartesp"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxCommand {
    /// Target box identifier
    pub box_id: String,
    /// Additional command fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl BoxCommand {
    /// Create an empty command for a box
    pub fn new(box_id: impl Into<String>) -> Self {
        Self {
            box_id: box_id.into(),
            fields: Map::new(),
        }
    }

    /// Create a `{"box_id": .., "cmd": ..}` command
    pub fn cmd(box_id: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self::new(box_id).field("cmd", cmd.into())
    }

    /// Add a field (builder pattern)
    ///
    /// A `box_id` key is ignored; the target is fixed at construction.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != "box_id" {
            self.fields.insert(key, value.into());
        }
        self
    }

    /// Build a command from caller-supplied fields
    pub fn with_fields(box_id: impl Into<String>, fields: Map<String, Value>) -> Self {
        fields
            .into_iter()
            .fold(Self::new(box_id), |cmd, (key, value)| cmd.field(key, value))
    }

    /// Serialize to a text payload
    pub fn to_payload(&self) -> Result<Payload, serde_json::Error> {
        serde_json::to_string(self).map(Payload::Text)
    }
}

/// Why a connection left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Peer closed the socket or the stream ended
    Remote,
    /// Server is shutting down
    Shutdown,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Remote => write!(f, "remote"),
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Connection lifecycle events, delivered to the registry through
/// [`ConnectionRegistry::dispatch`](super::ConnectionRegistry::dispatch)
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A new connection was accepted and greeted
    Connected(Arc<Connection>),
    /// A frame arrived from the peer
    MessageReceived { id: ConnectionId, payload: Payload },
    /// The connection ended cleanly
    Disconnected { id: ConnectionId, reason: CloseReason },
    /// The connection failed
    Error { id: ConnectionId, error: String },
}

impl ConnectionEvent {
    /// Connection the event refers to
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            ConnectionEvent::Connected(conn) => conn.id(),
            ConnectionEvent::MessageReceived { id, .. }
            | ConnectionEvent::Disconnected { id, .. }
            | ConnectionEvent::Error { id, .. } => *id,
        }
    }
}

/// Extract a `box_id` announced by a peer in a JSON text frame
pub(crate) fn announced_box_id(payload: &Payload) -> Option<String> {
    let text = payload.as_text()?;
    let value: Value = serde_json::from_str(text).ok()?;
    value.get("box_id")?.as_str().map(str::to_string)
}

/// Format an optional remote address for logs
pub(crate) fn display_addr(addr: Option<SocketAddr>) -> String {
    addr.map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
