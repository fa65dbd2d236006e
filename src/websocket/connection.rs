//! Individual WebSocket connection.
//!
//! A [`Connection`] is the registry-side handle of one accepted session.
//! Writes go through a bounded queue to the connection's writer task, which
//! acknowledges every frame once the socket write completes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use uuid::Uuid;

use super::messages::Payload;

/// Unique connection identifier
pub type ConnectionId = Uuid;

/// A frame queued for the writer task, with its acknowledgement channel
#[derive(Debug)]
pub struct Outbound {
    pub payload: Payload,
    ack: oneshot::Sender<Result<(), String>>,
}

impl Outbound {
    /// Report the socket write result back to the caller of [`Connection::write`]
    pub fn acknowledge(self, result: Result<(), String>) {
        // The writer may have timed out already; nobody is listening then.
        let _ = self.ack.send(result);
    }

    /// True once the caller of [`Connection::write`] stopped waiting, e.g.
    /// after its timeout elapsed. Such frames must not reach the socket.
    pub fn is_abandoned(&self) -> bool {
        self.ack.is_closed()
    }
}

/// Next frame still wanted by its caller; abandoned frames are discarded
pub async fn next_outbound(rx: &mut mpsc::Receiver<Outbound>) -> Option<Outbound> {
    while let Some(out) = rx.recv().await {
        if out.is_abandoned() {
            tracing::debug!("Dropping frame whose write already timed out");
            continue;
        }
        return Some(out);
    }
    None
}

/// Handle to one accepted session
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    remote_addr: Option<SocketAddr>,
    connected_at: DateTime<Utc>,
    /// Box identifier announced by the peer, if any
    box_id: RwLock<Option<String>>,
    /// `Open -> Closed`, never back
    open: AtomicBool,
    outbound: mpsc::Sender<Outbound>,
}

impl Connection {
    /// Create a connection writing into `outbound`
    pub fn new(remote_addr: Option<SocketAddr>, outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            id: Uuid::new_v4(),
            remote_addr,
            connected_at: Utc::now(),
            box_id: RwLock::new(None),
            open: AtomicBool::new(true),
            outbound,
        }
    }

    /// Create a connection together with the receiving end of its queue
    pub fn channel(
        remote_addr: Option<SocketAddr>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(remote_addr, tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Transition to Closed
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self) -> bool {
        self.open.swap(false, Ordering::SeqCst)
    }

    pub async fn box_id(&self) -> Option<String> {
        self.box_id.read().await.clone()
    }

    pub async fn set_box_id(&self, box_id: impl Into<String>) {
        *self.box_id.write().await = Some(box_id.into());
    }

    /// Write a payload, bounded by `timeout`
    ///
    /// The write counts as delivered once the writer task acknowledges it.
    /// `Closed` and `Transport` failures also close the connection.
    pub async fn write(&self, payload: Payload, timeout: Duration) -> Result<(), WriteError> {
        if !self.is_open() {
            return Err(WriteError::Closed);
        }

        let (ack, ack_rx) = oneshot::channel();
        let exchange = async {
            self.outbound
                .send(Outbound { payload, ack })
                .await
                .map_err(|_| WriteError::Closed)?;

            match ack_rx.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(WriteError::Transport(e)),
                Err(_) => Err(WriteError::Closed),
            }
        };

        let result = tokio::time::timeout(timeout, exchange)
            .await
            .unwrap_or(Err(WriteError::Timeout(timeout)));

        if let Err(WriteError::Closed | WriteError::Transport(_)) = &result {
            self.close();
        }
        result
    }

    /// Get a snapshot of connection info
    pub async fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            remote_addr: self.remote_addr,
            box_id: self.box_id().await,
            connected_at: self.connected_at,
            open: self.is_open(),
        }
    }
}

/// Snapshot of connection info (serializable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub remote_addr: Option<SocketAddr>,
    pub box_id: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub open: bool,
}

/// Failure of a single write
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("Connection is closed")]
    Closed,

    #[error("Write timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl WriteError {
    pub fn kind(&self) -> WriteErrorKind {
        match self {
            WriteError::Closed => WriteErrorKind::Closed,
            WriteError::Timeout(_) => WriteErrorKind::Timeout,
            WriteError::Transport(_) => WriteErrorKind::Transport,
        }
    }
}

/// Category of a write failure, as reported in broadcast results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteErrorKind {
    Closed,
    Timeout,
    Transport,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_write_acknowledged() {
        let (conn, mut rx) = Connection::channel(None, 4);

        let writer = tokio::spawn(async move {
            let out = rx.recv().await.unwrap();
            let payload = out.payload.clone();
            out.acknowledge(Ok(()));
            payload
        });

        conn.write(Payload::from("ping"), TIMEOUT).await.unwrap();
        assert_eq!(writer.await.unwrap(), Payload::from("ping"));
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn test_write_transport_error_closes() {
        let (conn, mut rx) = Connection::channel(None, 4);

        tokio::spawn(async move {
            let out = rx.recv().await.unwrap();
            out.acknowledge(Err("broken pipe".to_string()));
        });

        let err = conn.write(Payload::from("x"), TIMEOUT).await.unwrap_err();
        assert_eq!(err, WriteError::Transport("broken pipe".to_string()));
        assert_eq!(err.kind(), WriteErrorKind::Transport);
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_write_after_receiver_dropped() {
        let (conn, rx) = Connection::channel(None, 4);
        drop(rx);

        let err = conn.write(Payload::from("x"), TIMEOUT).await.unwrap_err();
        assert_eq!(err, WriteError::Closed);
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_write_to_closed_connection() {
        let (conn, _rx) = Connection::channel(None, 4);
        assert!(conn.close());

        let err = conn.write(Payload::from("x"), TIMEOUT).await.unwrap_err();
        assert_eq!(err.kind(), WriteErrorKind::Closed);
    }

    #[tokio::test]
    async fn test_write_timeout_keeps_connection_open() {
        // Receiver held but never drained or acknowledged
        let (conn, _rx) = Connection::channel(None, 4);

        let err = conn
            .write(Payload::from("x"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), WriteErrorKind::Timeout);
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn test_timed_out_frame_is_never_written() {
        let (conn, mut rx) = Connection::channel(None, 4);

        // Nobody drains the queue, so this write times out
        let err = conn
            .write(
                Payload::from(r#"{"box_id":"001","cmd":"restartesp"}"#),
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), WriteErrorKind::Timeout);

        let conn = std::sync::Arc::new(conn);
        let retry = {
            let conn = std::sync::Arc::clone(&conn);
            tokio::spawn(async move { conn.write(Payload::from("retry"), TIMEOUT).await })
        };

        // Writer catches up: only the retried frame comes out
        let out = next_outbound(&mut rx).await.unwrap();
        assert_eq!(out.payload, Payload::from("retry"));
        out.acknowledge(Ok(()));
        retry.await.unwrap().unwrap();

        drop(conn);
        assert!(next_outbound(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn test_pending_frame_is_not_abandoned() {
        let (conn, mut rx) = Connection::channel(None, 4);
        let conn = std::sync::Arc::new(conn);
        let pending = {
            let conn = std::sync::Arc::clone(&conn);
            tokio::spawn(async move { conn.write(Payload::from("x"), TIMEOUT).await })
        };

        let out = rx.recv().await.unwrap();
        assert!(!out.is_abandoned());
        out.acknowledge(Ok(()));
        pending.await.unwrap().unwrap();
    }

    #[test]
    fn test_close_transitions_once() {
        let (conn, _rx) = Connection::channel(None, 1);
        assert!(conn.is_open());
        assert!(conn.close());
        assert!(!conn.close());
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_info_snapshot() {
        let addr: SocketAddr = "10.0.0.7:51234".parse().unwrap();
        let (conn, _rx) = Connection::channel(Some(addr), 1);
        conn.set_box_id("001").await;

        let info = conn.info().await;
        assert_eq!(info.id, conn.id());
        assert_eq!(info.remote_addr, Some(addr));
        assert_eq!(info.box_id.as_deref(), Some("001"));
        assert!(info.open);
    }
}
