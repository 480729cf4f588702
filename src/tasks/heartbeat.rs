use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::WebSocketConfig;
use crate::metrics::HeartbeatMetrics;
use crate::session::{SendError, Session, SessionRegistry};

/// Per-ping timeout
const HEARTBEAT_SEND_TIMEOUT_MS: u64 = 5000;

/// Pings in flight at once
const MAX_CONCURRENT_HEARTBEATS: usize = 1000;

enum PingOutcome {
    Sent,
    Failed,
    TimedOut,
}

#[derive(Default)]
struct PingRound {
    sent: u64,
    failed: u64,
    timed_out: u64,
}

impl PingRound {
    fn record(&mut self, outcome: PingOutcome) {
        match outcome {
            PingOutcome::Sent => self.sent += 1,
            PingOutcome::Failed => self.failed += 1,
            PingOutcome::TimedOut => self.timed_out += 1,
        }
    }
}

async fn ping_session(registry: &SessionRegistry, session: &Arc<Session>) -> PingOutcome {
    let ping_timeout = Duration::from_millis(HEARTBEAT_SEND_TIMEOUT_MS);
    match timeout(ping_timeout, session.ping()).await {
        Ok(Ok(())) => PingOutcome::Sent,
        Ok(Err(e)) => {
            tracing::debug!(session_id = %session.id, error = %e, "Heartbeat ping failed");
            if e.is_terminal() && registry.deregister_session(session) {
                tracing::info!(session_id = %session.id, "Evicted session after failed ping");
            }
            PingOutcome::Failed
        }
        Err(_) => {
            tracing::debug!(
                session_id = %session.id,
                error = %SendError::Timeout(ping_timeout),
                "Heartbeat ping timed out"
            );
            PingOutcome::TimedOut
        }
    }
}

/// A round that uses more than half the interval risks overlapping the next
fn round_is_slow(elapsed_ms: u64, interval_ms: u64) -> bool {
    elapsed_ms > interval_ms / 2
}

/// Background task for heartbeat pings and idle session cleanup
pub struct HeartbeatTask {
    config: WebSocketConfig,
    registry: Arc<SessionRegistry>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        registry: Arc<SessionRegistry>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            shutdown,
        }
    }

    /// Run the heartbeat and cleanup tasks
    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval.max(1));
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval.max(1));
        let connection_timeout = self.config.connection_timeout;

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats().await;
                }
                _ = cleanup_timer.tick() => {
                    self.cleanup_idle_sessions(connection_timeout).await;
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Ping every session, `MAX_CONCURRENT_HEARTBEATS` at a time. A ping that
    /// fails terminally deregisters the session.
    async fn send_heartbeats(&self) {
        let sessions = match self.registry.snapshot() {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping heartbeat round");
                return;
            }
        };
        if sessions.is_empty() {
            return;
        }

        let start = Instant::now();
        let mut round = PingRound::default();

        for batch in sessions.chunks(MAX_CONCURRENT_HEARTBEATS) {
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|session| ping_session(&self.registry, session)),
            )
            .await;
            outcomes.into_iter().for_each(|outcome| round.record(outcome));
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        HeartbeatMetrics::record_pings(round.sent, round.failed, round.timed_out);

        tracing::debug!(
            total = sessions.len(),
            sent = round.sent,
            failed = round.failed,
            timed_out = round.timed_out,
            elapsed_ms,
            "Heartbeat round completed"
        );

        let interval_ms = self.config.heartbeat_interval.saturating_mul(1000);
        if round_is_slow(elapsed_ms, interval_ms) {
            tracing::warn!(
                elapsed_ms,
                heartbeat_interval_ms = interval_ms,
                sessions = sessions.len(),
                "Heartbeat round used more than half the interval"
            );
        }
    }

    /// Deregister and close sessions idle for longer than `timeout_secs`
    async fn cleanup_idle_sessions(&self, timeout_secs: u64) -> usize {
        let stale = self.registry.find_stale(timeout_secs);
        let mut removed = 0;

        for session in stale {
            if self.registry.deregister_session(&session) {
                tracing::info!(session_id = %session.id, "Removing idle session due to timeout");
                session.close().await;
                removed += 1;
            }
        }

        if removed > 0 {
            HeartbeatMetrics::record_idle_removed(removed as u64);
            tracing::info!(
                removed = removed,
                timeout_secs = timeout_secs,
                "Cleaned up idle sessions"
            );
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryTransport;
    use chrono::Utc;

    #[tokio::test]
    async fn test_heartbeat_task_shutdown() {
        let config = WebSocketConfig::default();
        let registry = Arc::new(SessionRegistry::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = HeartbeatTask::new(config, registry, shutdown_rx);

        // Spawn the task
        let handle = tokio::spawn(async move {
            task.run().await;
        });

        // Wait a bit then send shutdown
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        // Task should complete
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_heartbeat_pings_and_evicts_dead_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let (alive, _rx_alive) = MemoryTransport::new();
        let alive = Arc::new(alive);
        let (dead, _rx_dead) = MemoryTransport::new();
        let dead = Arc::new(dead);
        registry.register("alive", alive.clone()).unwrap();
        registry.register("dead", dead.clone()).unwrap();
        dead.fail_with(SendError::Closed);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = HeartbeatTask::new(WebSocketConfig::default(), registry.clone(), shutdown_rx);
        task.send_heartbeats().await;

        assert_eq!(alive.ping_count(), 1);
        assert!(registry.contains("alive"));
        assert!(!registry.contains("dead"));
    }

    #[tokio::test]
    async fn test_cleanup_idle_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let (idle, _rx) = MemoryTransport::new();
        let idle = Arc::new(idle);
        let session = registry.register("idle", idle.clone()).unwrap();
        let (busy, _rx) = MemoryTransport::new();
        registry.register("busy", Arc::new(busy)).unwrap();

        session.set_last_activity(Utc::now() - chrono::Duration::seconds(600));

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = HeartbeatTask::new(WebSocketConfig::default(), registry.clone(), shutdown_rx);

        assert_eq!(task.cleanup_idle_sessions(120).await, 1);
        assert!(!registry.contains("idle"));
        assert!(registry.contains("busy"));
        assert!(idle.is_closed());
    }

    #[test]
    fn test_slow_round_threshold() {
        assert!(!round_is_slow(10_000, 30_000));
        assert!(round_is_slow(20_000, 30_000));
    }

    #[tokio::test]
    async fn test_heartbeat_round_with_huge_interval() {
        let registry = Arc::new(SessionRegistry::new());
        let (transport, _rx) = MemoryTransport::new();
        let transport = Arc::new(transport);
        registry.register("a", transport.clone()).unwrap();

        let config = WebSocketConfig {
            heartbeat_interval: u64::MAX,
            ..WebSocketConfig::default()
        };
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = HeartbeatTask::new(config, registry, shutdown_rx);
        task.send_heartbeats().await;

        assert_eq!(transport.ping_count(), 1);
    }
}
