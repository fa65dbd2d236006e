//! Inbound message hook.

use async_trait::async_trait;

use super::connection::ConnectionInfo;
use super::messages::Payload;

/// Called for every frame a peer sends
///
/// Implement this to act on device traffic without touching the registry.
#[async_trait]
pub trait MessageHook: Send + Sync {
    async fn on_message(&self, connection: &ConnectionInfo, payload: &Payload);
}

/// Default hook: log and move on
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHook;

#[async_trait]
impl MessageHook for LoggingHook {
    async fn on_message(&self, connection: &ConnectionInfo, payload: &Payload) {
        match payload {
            Payload::Text(text) => tracing::info!(
                connection_id = %connection.id,
                box_id = connection.box_id.as_deref().unwrap_or("-"),
                message = %text,
                "Received from box"
            ),
            Payload::Binary(bytes) => tracing::info!(
                connection_id = %connection.id,
                box_id = connection.box_id.as_deref().unwrap_or("-"),
                bytes = bytes.len(),
                "Received binary frame from box"
            ),
        }
    }
}
