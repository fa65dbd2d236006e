//! Box Relay HTTP API
//!
//! HTTP and WebSocket surface of the relay, built with Axum.
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /` - Box connection (what devices dial)
//! - `GET /ws` - Same, under an explicit path
//!
//! ## Broadcast
//! - `POST /api/v1/broadcast` - Send a JSON command to connected boxes
//! - `POST /api/v1/broadcast/raw` - Send the request body verbatim
//!
//! ## Connections
//! - `GET /api/v1/connections` - List connected boxes
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,no_run
//! use box_relay::api::{serve, ApiConfig, AppState};
//! use box_relay::websocket::RegistryConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = AppState::new(ApiConfig::default(), RegistryConfig::default());
//!     serve(state).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::websocket::websocket_handler;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/broadcast", post(routes::broadcast::broadcast_command))
        .route("/broadcast/raw", post(routes::broadcast::broadcast_raw))
        .route("/connections", get(routes::connections::list_connections));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .route("/", get(websocket_handler))
        .route("/ws", get(websocket_handler))
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the server and run until Ctrl+C / SIGTERM
pub async fn serve(state: AppState) -> Result<(), ApiError> {
    let addr = state.config.addr();
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Box relay listening on ws://{}", addr);

    serve_with_shutdown(listener, state, shutdown_signal()).await?;

    tracing::info!("Box relay shut down gracefully");
    Ok(())
}

/// Serve on an already bound listener until `signal` resolves
///
/// Every registered connection is closed once the signal fires.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    state: AppState,
    signal: F,
) -> Result<(), ApiError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = Arc::clone(&state.registry);
    let router = build_router(state);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        signal.await;
        registry.shutdown().await;
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::{BroadcastResponse, ConnectionsResponse, HealthResponse};
    use crate::websocket::{Connection, ConnectionRegistry, Payload, RegistryConfig};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde::de::DeserializeOwned;
    use tokio::sync::mpsc;
    use tower::util::ServiceExt;

    fn create_test_app() -> (Router, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new(RegistryConfig::default()));
        let state = AppState::with_registry(ApiConfig::default(), Arc::clone(&registry));
        (build_router(state), registry)
    }

    async fn connect_peer(registry: &ConnectionRegistry) -> mpsc::UnboundedReceiver<Payload> {
        let (conn, mut rx) = Connection::channel(None, 8);
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(out) = rx.recv().await {
                let _ = seen_tx.send(out.payload.clone());
                out.acknowledge(Ok(()));
            }
        });
        registry.register(Arc::new(conn)).await;
        seen_rx
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, content_type: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", content_type)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let (app, _registry) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health/live")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full_reports_connections() {
        let (app, registry) = create_test_app();
        let _peer = connect_peer(&registry).await;

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = read_json(response).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.connections, 1);
    }

    #[tokio::test]
    async fn test_broadcast_command() {
        let (app, registry) = create_test_app();
        let mut peer_a = connect_peer(&registry).await;
        let mut peer_b = connect_peer(&registry).await;

        let response = app
            .oneshot(post(
                "/api/v1/broadcast",
                "application/json",
                r#"{"box_id": "001", "cmd": "restartesp"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: BroadcastResponse = read_json(response).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.delivered, 2);
        assert_eq!(body.failed, 0);

        let expected = Payload::from(r#"{"box_id":"001","cmd":"restartesp"}"#);
        assert_eq!(peer_a.recv().await.unwrap(), expected);
        assert_eq!(peer_b.recv().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_broadcast_uses_default_box_id() {
        let (app, registry) = create_test_app();
        let mut peer = connect_peer(&registry).await;

        let response = app
            .oneshot(post(
                "/api/v1/broadcast",
                "application/json",
                r#"{"port": 1883}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            peer.recv().await.unwrap(),
            Payload::from(r#"{"box_id":"001","port":1883}"#)
        );
    }

    #[tokio::test]
    async fn test_broadcast_with_no_connections() {
        let (app, _registry) = create_test_app();

        let response = app
            .oneshot(post(
                "/api/v1/broadcast",
                "application/json",
                r#"{"cmd": "restartesp"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: BroadcastResponse = read_json(response).await;
        assert_eq!(body.delivered, 0);
        assert_eq!(body.failed, 0);
    }

    #[tokio::test]
    async fn test_broadcast_invalid_json() {
        let (app, _registry) = create_test_app();

        let response = app
            .oneshot(post("/api/v1/broadcast", "application/json", "not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_broadcast_non_object_body() {
        let (app, _registry) = create_test_app();

        let response = app
            .oneshot(post("/api/v1/broadcast", "application/json", "[1, 2, 3]"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_broadcast_empty_box_id() {
        let (app, _registry) = create_test_app();

        let response = app
            .oneshot(post(
                "/api/v1/broadcast",
                "application/json",
                r#"{"box_id": "  ", "cmd": "restartesp"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_broadcast_raw() {
        let (app, registry) = create_test_app();
        let mut peer = connect_peer(&registry).await;

        let response = app
            .oneshot(post("/api/v1/broadcast/raw", "text/plain", "PING"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: BroadcastResponse = read_json(response).await;
        assert_eq!(body.delivered, 1);
        assert_eq!(peer.recv().await.unwrap(), Payload::from("PING"));
    }

    #[tokio::test]
    async fn test_broadcast_raw_empty() {
        let (app, _registry) = create_test_app();

        let response = app
            .oneshot(post("/api/v1/broadcast/raw", "text/plain", ""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_connections() {
        let (app, registry) = create_test_app();
        let _a = connect_peer(&registry).await;
        let _b = connect_peer(&registry).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/connections")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: ConnectionsResponse = read_json(response).await;
        assert_eq!(body.count, 2);
        assert!(body.connections.iter().all(|c| c.open));
    }
}
