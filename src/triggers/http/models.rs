use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for `POST /api/v1/broadcast`
#[derive(Debug, Deserialize)]
pub struct BroadcastMessageRequest {
    pub payload: String,
    /// Send the payload's UTF-8 bytes as a binary frame
    #[serde(default)]
    pub binary: bool,
    /// Session ids that must not receive the payload
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BroadcastAcceptedResponse {
    pub broadcast_id: Uuid,
    pub accepted_at: DateTime<Utc>,
}
