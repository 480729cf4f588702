//! Graceful shutdown handling for the broadcast service.
//!
//! 1. Signals background tasks (broadcast worker, heartbeat) to stop
//! 2. Stops the dispatcher from scheduling new sends
//! 3. Closes the registry and releases every session transport

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::broadcast::BroadcastDispatcher;
use crate::session::SessionRegistry;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for session transports to close (default: 5 seconds)
    pub close_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of a shutdown run
#[derive(Debug, Default, Clone)]
pub struct ShutdownResult {
    pub sessions_closed: usize,
    pub sessions_total: usize,
    pub duration: Duration,
}

/// Handles graceful shutdown of the broadcast service
pub struct GracefulShutdown {
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<BroadcastDispatcher>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(
        registry: Arc<SessionRegistry>,
        dispatcher: Arc<BroadcastDispatcher>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self::with_config(registry, dispatcher, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        registry: Arc<SessionRegistry>,
        dispatcher: Arc<BroadcastDispatcher>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            shutdown_tx,
            config,
        }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_sessions = self.registry.len())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Stopping background tasks");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 2: Closing worker pool");
        self.dispatcher.shutdown();

        tracing::info!("Phase 3: Closing sessions");
        let sessions = self.registry.close();
        result.sessions_total = sessions.len();

        let mut closing: FuturesUnordered<_> = sessions
            .into_iter()
            .map(|session| async move { session.close().await })
            .collect();

        let close_all = async {
            let mut closed = 0;
            while closing.next().await.is_some() {
                closed += 1;
            }
            closed
        };

        result.sessions_closed = match timeout(self.config.close_timeout, close_all).await {
            Ok(closed) => closed,
            Err(_) => {
                tracing::warn!(
                    total = result.sessions_total,
                    "Timed out closing sessions, remaining transports abandoned"
                );
                0
            }
        };

        result.duration = start.elapsed();

        tracing::info!(
            sessions_closed = result.sessions_closed,
            sessions_total = result.sessions_total,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastRequest;
    use crate::session::{MemoryTransport, SessionStatus};

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Arc::new(BroadcastDispatcher::with_pool(
            registry.clone(),
            4,
            Duration::from_secs(1),
        ));
        let (transport, _rx) = MemoryTransport::new();
        let transport = Arc::new(transport);
        let session = registry.register("a", transport.clone()).unwrap();

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let shutdown = GracefulShutdown::new(registry.clone(), dispatcher.clone(), shutdown_tx);

        let result = shutdown.execute("test").await;

        assert_eq!(result.sessions_total, 1);
        assert_eq!(result.sessions_closed, 1);
        assert!(shutdown_rx.try_recv().is_ok());
        assert!(transport.is_closed());
        assert_eq!(session.status(), SessionStatus::Closed);
        assert!(registry.is_closed());
        assert!(dispatcher.broadcast(BroadcastRequest::new("x")).await.is_err());
    }
}
