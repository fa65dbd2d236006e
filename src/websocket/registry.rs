//! WebSocket Connection Registry
//!
//! The authoritative set of open connections. Registration, deregistration
//! and broadcast may run concurrently from any task: mutations take the
//! write lock, broadcast only holds the read lock long enough to snapshot.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::connection::{Connection, ConnectionId, ConnectionInfo, WriteErrorKind};
use super::hook::{LoggingHook, MessageHook};
use super::messages::{
    announced_box_id, display_addr, BoxCommand, CloseReason, ConnectionEvent, Payload,
};

/// Configuration for the connection registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Upper bound for a single write to one peer
    pub write_timeout: Duration,
    /// Only deliver targeted broadcasts to connections that announced the
    /// matching box id
    pub filter_by_target: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(5),
            filter_by_target: false,
        }
    }
}

/// Tracks all open connections and fans payloads out to them
pub struct ConnectionRegistry {
    /// Open connections: ConnectionId → Connection
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    /// Inbound message hook
    hook: Arc<dyn MessageHook>,
    config: RegistryConfig,
    /// Set by `shutdown`; no registration is accepted afterwards
    shutting_down: AtomicBool,
}

impl ConnectionRegistry {
    /// Create a registry with the logging hook
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_hook(config, Arc::new(LoggingHook))
    }

    /// Create a registry with a custom inbound message hook
    pub fn with_hook(config: RegistryConfig, hook: Arc<dyn MessageHook>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            hook,
            config,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Register an open connection
    ///
    /// Returns `false` if the connection is already registered, already
    /// closed, or the registry has shut down; the registry is left unchanged
    /// in that case. A connection refused during shutdown is closed.
    pub async fn register(&self, connection: Arc<Connection>) -> bool {
        if !connection.is_open() {
            return false;
        }

        let id = connection.id();
        let remote_addr = connection.remote_addr();

        {
            let mut connections = self.connections.write().await;
            if self.shutting_down.load(Ordering::SeqCst) {
                connection.close();
                tracing::debug!(connection_id = %id, "Registry shut down, connection refused");
                return false;
            }
            if connections.contains_key(&id) {
                return false;
            }
            connections.insert(id, connection);
        }

        tracing::info!(
            connection_id = %id,
            remote_addr = %display_addr(remote_addr),
            "Client connected"
        );
        true
    }

    /// Remove a connection and mark it closed
    ///
    /// Removing an absent connection is a no-op.
    pub async fn deregister(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.connections.write().await.remove(&id);

        if let Some(connection) = &removed {
            connection.close();
            tracing::info!(
                connection_id = %id,
                remote_addr = %display_addr(connection.remote_addr()),
                "Client disconnected"
            );
        }

        removed
    }

    /// Send a payload to every open connection
    pub async fn broadcast(&self, payload: Payload) -> BroadcastResult {
        self.broadcast_to(payload, None).await
    }

    /// Send a payload to open connections, optionally narrowed to one box
    ///
    /// `target` only narrows delivery when target filtering is enabled;
    /// otherwise every open connection receives the payload.
    pub async fn broadcast_to(&self, payload: Payload, target: Option<&str>) -> BroadcastResult {
        let snapshot: Vec<Arc<Connection>> = self
            .connections
            .read()
            .await
            .values()
            .filter(|conn| conn.is_open())
            .cloned()
            .collect();

        let recipients = match (self.config.filter_by_target, target) {
            (true, Some(box_id)) => {
                let mut matching = Vec::with_capacity(snapshot.len());
                for conn in snapshot {
                    if conn.box_id().await.as_deref() == Some(box_id) {
                        matching.push(conn);
                    }
                }
                matching
            }
            _ => snapshot,
        };

        let timeout = self.config.write_timeout;
        let writes = recipients.into_iter().map(|conn| {
            let payload = payload.clone();
            async move {
                let outcome = conn.write(payload, timeout).await;
                (conn, outcome)
            }
        });

        let mut result = BroadcastResult::default();
        for (conn, outcome) in join_all(writes).await {
            match outcome {
                Ok(()) => result.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        connection_id = %conn.id(),
                        remote_addr = %display_addr(conn.remote_addr()),
                        error = %e,
                        "Broadcast write failed"
                    );

                    let kind = e.kind();
                    if matches!(kind, WriteErrorKind::Closed | WriteErrorKind::Transport) {
                        self.deregister(conn.id()).await;
                    }

                    result.failures.push(DeliveryFailure {
                        connection_id: conn.id(),
                        remote_addr: conn.remote_addr(),
                        kind,
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            bytes = payload.len(),
            delivered = result.delivered,
            failed = result.failures.len(),
            "Broadcast complete"
        );

        result
    }

    /// Serialize a box command and broadcast it toward its box
    pub async fn broadcast_command(
        &self,
        command: &BoxCommand,
    ) -> Result<BroadcastResult, serde_json::Error> {
        let payload = command.to_payload()?;
        if let Payload::Text(text) = &payload {
            tracing::info!(box_id = %command.box_id, command = %text, "Sending command");
        }
        Ok(self.broadcast_to(payload, Some(&command.box_id)).await)
    }

    /// Single entry point for connection lifecycle events
    pub async fn dispatch(&self, event: ConnectionEvent) {
        tracing::trace!(connection_id = %event.connection_id(), "Dispatching event");
        match event {
            ConnectionEvent::Connected(connection) => {
                self.register(connection).await;
            }
            ConnectionEvent::MessageReceived { id, payload } => {
                self.on_message(id, payload).await;
            }
            ConnectionEvent::Disconnected { id, reason } => {
                tracing::debug!(connection_id = %id, reason = %reason, "Connection closed");
                self.deregister(id).await;
            }
            ConnectionEvent::Error { id, error } => {
                tracing::warn!(connection_id = %id, error = %error, "Connection error");
                self.deregister(id).await;
            }
        }
    }

    /// Route an inbound frame to the message hook
    async fn on_message(&self, id: ConnectionId, payload: Payload) {
        let Some(connection) = self.get(id).await else {
            tracing::debug!(connection_id = %id, "Message from unregistered connection ignored");
            return;
        };

        if let Some(box_id) = announced_box_id(&payload) {
            if connection.box_id().await.as_deref() != Some(box_id.as_str()) {
                tracing::debug!(connection_id = %id, box_id = %box_id, "Box identified");
                connection.set_box_id(box_id).await;
            }
        }

        let info = connection.info().await;
        self.hook.on_message(&info, &payload).await;
    }

    /// Close and remove every connection
    ///
    /// Returns the number of connections closed. Later registrations are
    /// refused.
    pub async fn shutdown(&self) -> usize {
        self.shutting_down.store(true, Ordering::SeqCst);
        let drained: Vec<Arc<Connection>> = self
            .connections
            .write()
            .await
            .drain()
            .map(|(_, conn)| conn)
            .collect();

        for conn in &drained {
            conn.close();
            tracing::debug!(
                connection_id = %conn.id(),
                reason = %CloseReason::Shutdown,
                "Connection closed"
            );
        }

        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Closed all connections");
        }
        drained.len()
    }

    /// Look up a registered connection
    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().await.get(&id).cloned()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Snapshot of every registered connection
    pub async fn connections(&self) -> Vec<ConnectionInfo> {
        let snapshot: Vec<Arc<Connection>> =
            self.connections.read().await.values().cloned().collect();

        let mut infos = Vec::with_capacity(snapshot.len());
        for conn in snapshot {
            infos.push(conn.info().await);
        }
        infos.sort_by_key(|info| info.connected_at);
        infos
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

/// Outcome of a broadcast
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastResult {
    /// Number of connections that acknowledged the write
    pub delivered: usize,
    /// Connections the payload could not be written to
    pub failures: Vec<DeliveryFailure>,
}

impl BroadcastResult {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// True when no write failed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A single failed delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub connection_id: ConnectionId,
    pub remote_addr: Option<SocketAddr>,
    pub kind: WriteErrorKind,
    pub message: String,
}
