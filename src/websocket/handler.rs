use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::StreamExt;
use uuid::Uuid;

use crate::metrics::{
    WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED, WS_CONNECTION_DURATION, WS_MESSAGES_RECEIVED,
};
use crate::server::AppState;
use crate::session::Session;

use super::lifecycle::ConnectionLifecycle;
use super::transport::{write_frames, WsTransport};

/// Time allowed for the writer to flush the close frame
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection
#[tracing::instrument(name = "ws.connection", skip(socket, state))]
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    let connection_start = std::time::Instant::now();

    let (transport, frames) = WsTransport::channel(state.settings.websocket.channel_buffer_size);
    let mut lifecycle =
        ConnectionLifecycle::new(state.registry.clone(), session_id.clone(), Arc::new(transport));

    // Split socket into sender and receiver
    let (ws_sender, mut ws_receiver) = socket.split();

    // The writer task owns the sink for the lifetime of the connection
    let mut send_task = tokio::spawn(write_frames(ws_sender, frames));

    let session = match lifecycle.on_open().await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "Connection rejected");
            let _ = tokio::time::timeout(WRITER_DRAIN_TIMEOUT, send_task).await;
            return;
        }
    };

    WS_CONNECTIONS_OPENED.inc();
    tracing::info!(session_id = %session_id, "WebSocket connection established");

    // Task for receiving messages from WebSocket
    let recv_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &recv_session) {
                        return Ok(());
                    }
                }
                Err(e) => return Err(e.to_string()),
            }
        }
        Ok(())
    });

    // Wait for either task to complete
    tokio::select! {
        written = &mut send_task => {
            recv_task.abort();
            match written {
                Ok(Ok(())) => {
                    tracing::debug!(session_id = %session_id, "Send task completed");
                    lifecycle.on_closing().await;
                }
                Ok(Err(e)) => lifecycle.on_error(&e.to_string()).await,
                Err(e) => lifecycle.on_error(&e.to_string()).await,
            }
        }
        received = &mut recv_task => {
            match received {
                Ok(Ok(())) => {
                    tracing::debug!(session_id = %session_id, "Receive task completed");
                    lifecycle.on_closing().await;
                }
                Ok(Err(e)) => lifecycle.on_error(&e).await,
                Err(e) => lifecycle.on_error(&e.to_string()).await,
            }
            if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
    }

    // Record connection closed and duration metrics
    WS_CONNECTIONS_CLOSED.inc();
    let duration = connection_start.elapsed().as_secs_f64();
    WS_CONNECTION_DURATION.observe(duration);

    tracing::info!(
        session_id = %session_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket message.
/// Returns false if the connection should be closed.
fn process_message(msg: Message, session: &Session) -> bool {
    match msg {
        Message::Text(_) | Message::Binary(_) => {
            // Clients only listen; inbound frames count as activity
            WS_MESSAGES_RECEIVED.inc();
            session.update_activity();
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings itself
            session.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(session_id = %session.id, "Received close frame");
            false
        }
    }
}
