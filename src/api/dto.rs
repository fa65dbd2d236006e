//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::websocket::{BroadcastResult, ConnectionInfo, DeliveryFailure};

// ============================================
// BROADCAST DTOs
// ============================================

/// Command broadcast request
///
/// Any fields besides `box_id` are forwarded to the boxes unchanged.
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    /// Target box; falls back to the configured default
    #[serde(default)]
    pub box_id: Option<String>,
    /// Command fields, e.g. `"cmd": "restartesp"`
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Broadcast response
#[derive(Debug, Serialize, Deserialize)]
pub struct BroadcastResponse {
    /// Status: "ok" or "partial"
    pub status: String,
    /// Number of boxes that received the payload
    pub delivered: usize,
    /// Number of failed writes
    pub failed: usize,
    /// Per-connection failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<DeliveryFailure>,
}

impl From<BroadcastResult> for BroadcastResponse {
    fn from(result: BroadcastResult) -> Self {
        let status = if result.is_complete() { "ok" } else { "partial" };
        Self {
            status: status.to_string(),
            delivered: result.delivered,
            failed: result.failed(),
            failures: result.failures,
        }
    }
}

// ============================================
// CONNECTION DTOs
// ============================================

/// Connection listing response
#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionsResponse {
    pub count: usize,
    pub connections: Vec<ConnectionInfo>,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health status
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    pub uptime_seconds: u64,
    pub version: String,
}
