use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use websocket_broadcast_service::config::Settings;
use websocket_broadcast_service::server::{create_app, AppState};
use websocket_broadcast_service::shutdown::GracefulShutdown;
use websocket_broadcast_service::tasks::HeartbeatTask;
use websocket_broadcast_service::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    telemetry::init_tracing(&settings.logging)?;
    tracing::info!("Configuration loaded");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Create application state
    let (state, broadcast_worker) = AppState::new(settings.clone());
    tracing::info!(
        worker_pool_size = settings.dispatcher.worker_pool_size,
        max_sessions = settings.websocket.max_sessions,
        "Application state initialized"
    );

    // Start broadcast worker in background
    let worker_handle = tokio::spawn(broadcast_worker.run(shutdown_tx.subscribe()));

    // Start heartbeat task in background
    let heartbeat_task = HeartbeatTask::new(
        settings.websocket.clone(),
        state.registry.clone(),
        shutdown_tx.subscribe(),
    );
    let heartbeat_handle = tokio::spawn(heartbeat_task.run());

    let graceful_shutdown = GracefulShutdown::new(
        state.registry.clone(),
        state.dispatcher.clone(),
        shutdown_tx.clone(),
    );

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        websocket_path = %settings.websocket.path,
        "Server listening on {}",
        addr
    );

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(graceful_shutdown))
        .await?;

    // Wait for background tasks to finish
    tracing::info!("Waiting for background tasks to finish...");
    let _ = tokio::join!(worker_handle, heartbeat_handle);

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(graceful_shutdown: GracefulShutdown) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let reason = tokio::select! {
        _ = ctrl_c => "ctrl_c",
        _ = terminate => "terminate",
    };
    tracing::info!(reason = reason, "Received shutdown signal, initiating graceful shutdown");

    // Close sessions before the listener stops so WebSocket tasks can finish
    graceful_shutdown.execute(reason).await;
}
