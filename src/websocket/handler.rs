//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.
//! Socket activity is turned into [`ConnectionEvent`]s for the registry.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::connection::{next_outbound, Connection, ConnectionId, Outbound};
use super::messages::{display_addr, CloseReason, ConnectionEvent, Payload, WelcomeMessage};
use super::registry::ConnectionRegistry;
use crate::api::AppState;

/// WebSocket upgrade handler
///
/// This is the entry point for box connections.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let remote_addr = connect_info.map(|ConnectInfo(addr)| addr);
    let registry = Arc::clone(&state.registry);
    let welcome = WelcomeMessage::new(state.config.welcome_message.clone());
    let outbound_buffer = state.config.outbound_buffer;

    ws.on_upgrade(move |socket| {
        handle_socket(socket, remote_addr, registry, welcome, outbound_buffer)
    })
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    remote_addr: Option<SocketAddr>,
    registry: Arc<ConnectionRegistry>,
    welcome: WelcomeMessage,
    outbound_buffer: usize,
) {
    let (mut sender, receiver) = socket.split();

    // Greet before registering so broadcasts never precede the welcome
    let greeting = match welcome.to_payload() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize welcome message");
            return;
        }
    };
    if let Err(e) = sender.send(into_message(greeting)).await {
        tracing::warn!(
            remote_addr = %display_addr(remote_addr),
            error = %e,
            "Failed to send welcome message"
        );
        return;
    }

    let (connection, rx) = Connection::channel(remote_addr, outbound_buffer);
    let connection_id = connection.id();
    registry
        .dispatch(ConnectionEvent::Connected(Arc::new(connection)))
        .await;

    // Refused, e.g. the relay began shutting down after the greeting
    if !registry.contains(connection_id).await {
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    let mut send_task = tokio::spawn(run_writer(sender, rx, connection_id));
    let mut recv_task = tokio::spawn(run_reader(
        receiver,
        Arc::clone(&registry),
        connection_id,
    ));

    // Wait for either task to complete
    let finished = tokio::select! {
        result = &mut send_task => {
            recv_task.abort();
            result
        }
        result = &mut recv_task => {
            send_task.abort();
            result
        }
    };

    let event = finished.unwrap_or_else(|e| ConnectionEvent::Error {
        id: connection_id,
        error: format!("connection task failed: {}", e),
    });

    // Cleanup: deregistering twice is harmless
    registry.dispatch(event).await;
}

/// Drain the outbound queue into the socket, acknowledging every frame
async fn run_writer(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    connection_id: ConnectionId,
) -> ConnectionEvent {
    while let Some(out) = next_outbound(&mut rx).await {
        let message = into_message(out.payload.clone());
        match sender.send(message).await {
            Ok(()) => out.acknowledge(Ok(())),
            Err(e) => {
                let error = e.to_string();
                tracing::debug!(
                    connection_id = %connection_id,
                    error = %error,
                    "WebSocket send failed, closing connection"
                );
                out.acknowledge(Err(error.clone()));
                return ConnectionEvent::Error {
                    id: connection_id,
                    error,
                };
            }
        }
    }

    // Queue closed: the registry let go of this connection
    let _ = sender.send(Message::Close(None)).await;
    ConnectionEvent::Disconnected {
        id: connection_id,
        reason: CloseReason::Shutdown,
    }
}

/// Forward inbound frames to the registry until the peer goes away
async fn run_reader(
    mut receiver: SplitStream<WebSocket>,
    registry: Arc<ConnectionRegistry>,
    connection_id: ConnectionId,
) -> ConnectionEvent {
    while let Some(result) = receiver.next().await {
        let payload = match result {
            Ok(Message::Text(text)) => Payload::Text(text),
            Ok(Message::Binary(bytes)) => Payload::Binary(bytes),
            // Axum answers pings itself
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %connection_id, "Client requested close");
                break;
            }
            Err(e) => {
                return ConnectionEvent::Error {
                    id: connection_id,
                    error: e.to_string(),
                };
            }
        };

        registry
            .dispatch(ConnectionEvent::MessageReceived {
                id: connection_id,
                payload,
            })
            .await;
    }

    ConnectionEvent::Disconnected {
        id: connection_id,
        reason: CloseReason::Remote,
    }
}

fn into_message(payload: Payload) -> Message {
    match payload {
        Payload::Text(text) => Message::Text(text),
        Payload::Binary(bytes) => Message::Binary(bytes),
    }
}
