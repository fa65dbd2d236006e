//! Broadcast Routes
//!
//! External trigger for pushing commands to connected boxes.
//!
//! - POST /api/v1/broadcast - JSON command, `box_id` defaults to config
//! - POST /api/v1/broadcast/raw - Body bytes forwarded verbatim

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{BroadcastRequest, BroadcastResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::websocket::{BoxCommand, Payload};

/// POST /api/v1/broadcast
///
/// Wrap the body as a box command and send it to every open connection.
pub async fn broadcast_command(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BroadcastRequest>, JsonRejection>,
) -> ApiResult<Json<BroadcastResponse>> {
    let Json(req) = body?;

    let box_id = req
        .box_id
        .unwrap_or_else(|| state.config.default_box_id.clone());
    if box_id.trim().is_empty() {
        return Err(ApiError::Validation("box_id must not be empty".to_string()));
    }

    let command = BoxCommand::with_fields(box_id, req.fields);
    let result = state.registry.broadcast_command(&command).await?;

    tracing::info!(
        box_id = %command.box_id,
        delivered = result.delivered,
        failed = result.failed(),
        "Command broadcast"
    );

    Ok(Json(result.into()))
}

/// POST /api/v1/broadcast/raw
///
/// Broadcast the request body as-is. UTF-8 bodies go out as text frames,
/// anything else as binary.
pub async fn broadcast_raw(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<BroadcastResponse>> {
    if body.is_empty() {
        return Err(ApiError::Validation("Empty payload".to_string()));
    }

    let payload = Payload::from_bytes(body.to_vec());
    let result = state.registry.broadcast(payload).await;

    tracing::info!(
        bytes = body.len(),
        delivered = result.delivered,
        failed = result.failed(),
        "Raw payload broadcast"
    );

    Ok(Json(result.into()))
}
