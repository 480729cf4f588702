use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::broadcast::BroadcastRequest;
use crate::error::Result;
use crate::session::Payload;
use crate::server::AppState;

use super::models::{BroadcastAcceptedResponse, BroadcastMessageRequest};

/// Broadcast the path value to every connected session
#[tracing::instrument(name = "http.hi", skip(state, name))]
pub async fn hi(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode> {
    state.trigger.handle_request(&name)?;
    Ok(StatusCode::ACCEPTED)
}

/// Broadcast a JSON-supplied payload
#[tracing::instrument(
    name = "http.broadcast",
    skip(state, request),
    fields(exclude_count = request.exclude.len())
)]
pub async fn broadcast_message(
    State(state): State<AppState>,
    Json(request): Json<BroadcastMessageRequest>,
) -> Result<(StatusCode, Json<BroadcastAcceptedResponse>)> {
    let payload = if request.binary {
        Payload::binary(request.payload.into_bytes())
    } else {
        Payload::text(request.payload)
    };
    let broadcast = BroadcastRequest::new(payload).excluding(request.exclude);
    let broadcast_id = state.trigger.submit(broadcast)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(BroadcastAcceptedResponse {
            broadcast_id,
            accepted_at: Utc::now(),
        }),
    ))
}
