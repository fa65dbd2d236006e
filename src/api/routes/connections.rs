//! Connection Routes
//!
//! - GET /api/v1/connections - List connected boxes

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::ConnectionsResponse;
use crate::api::state::AppState;

/// GET /api/v1/connections
pub async fn list_connections(State(state): State<Arc<AppState>>) -> Json<ConnectionsResponse> {
    let connections = state.registry.connections().await;

    Json(ConnectionsResponse {
        count: connections.len(),
        connections,
    })
}
