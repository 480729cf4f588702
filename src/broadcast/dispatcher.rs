use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::config::DispatcherConfig;
use crate::metrics::BroadcastMetrics;
use crate::session::{Payload, RegistryError, SendError, Session, SessionId, SessionRegistry};

use super::{BroadcastRequest, BroadcastResult, SendFailure};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The registry could not produce a snapshot; nothing was sent
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("dispatcher is shutting down")]
    ShuttingDown,
}

/// Statistics for the broadcast dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub broadcasts: AtomicU64,
    pub aborted: AtomicU64,
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub evicted: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub broadcasts: u64,
    pub aborted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub evicted: u64,
}

struct SendOutcome {
    session_id: SessionId,
    result: Result<(), SendError>,
    evicted: bool,
}

/// Fans one payload out to every registered session.
///
/// Each recipient gets its own send task. Tasks draw permits from a semaphore
/// shared by all broadcasts, so the number of in-flight sends never exceeds
/// the pool size no matter how many sessions or concurrent broadcasts exist.
pub struct BroadcastDispatcher {
    registry: Arc<SessionRegistry>,
    workers: Arc<Semaphore>,
    pool_size: usize,
    send_timeout: Duration,
    stats: DispatcherStats,
}

impl BroadcastDispatcher {
    pub fn new(registry: Arc<SessionRegistry>, config: &DispatcherConfig) -> Self {
        Self::with_pool(
            registry,
            config.worker_pool_size,
            Duration::from_millis(config.send_timeout_ms),
        )
    }

    pub fn with_pool(
        registry: Arc<SessionRegistry>,
        pool_size: usize,
        send_timeout: Duration,
    ) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            registry,
            workers: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            send_timeout,
            stats: DispatcherStats::default(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Permits not currently held by a send task
    pub fn idle_workers(&self) -> usize {
        self.workers.available_permits()
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop scheduling new sends. Sends already running complete normally.
    pub fn shutdown(&self) {
        self.workers.close();
    }

    /// Deliver `request` to every registered session not in its exclusion set
    #[tracing::instrument(
        name = "dispatcher.broadcast",
        skip(self, request),
        fields(
            broadcast_id = %request.id,
            payload_kind = request.payload.kind(),
            payload_len = request.payload.len()
        )
    )]
    pub async fn broadcast(
        &self,
        request: BroadcastRequest,
    ) -> Result<BroadcastResult, DispatchError> {
        let started = Instant::now();

        let sessions = match self.registry.snapshot() {
            Ok(sessions) => sessions,
            Err(e) => {
                self.stats.aborted.fetch_add(1, Ordering::Relaxed);
                BroadcastMetrics::record_aborted();
                tracing::error!(error = %e, "Broadcast aborted, registry unavailable");
                return Err(e.into());
            }
        };

        let mut result = BroadcastResult::empty(request.id);
        let mut tasks = JoinSet::new();
        let mut shutting_down = false;

        for session in sessions {
            if request.is_excluded(&session.id) {
                result.excluded += 1;
                continue;
            }

            let permit = match self.workers.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    shutting_down = true;
                    break;
                }
            };

            let registry = self.registry.clone();
            let payload = request.payload.clone();
            let send_timeout = self.send_timeout;

            tasks.spawn(async move {
                let _permit = permit;
                AssertUnwindSafe(send_to_session(
                    &registry,
                    session.clone(),
                    payload,
                    send_timeout,
                ))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| panicked_send(&registry, &session))
            });
        }

        let fanout = tasks.len();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(SendOutcome {
                    result: Ok(()), ..
                }) => result.success_count += 1,
                Ok(SendOutcome {
                    session_id,
                    result: Err(error),
                    evicted,
                }) => {
                    BroadcastMetrics::record_failed(error.reason());
                    if evicted {
                        self.stats.evicted.fetch_add(1, Ordering::Relaxed);
                        BroadcastMetrics::record_evicted();
                    }
                    result.failures.push(SendFailure { session_id, error });
                }
                Err(e) => {
                    // Only reachable if the runtime cancels the task
                    tracing::error!(error = %e, "Send task did not complete");
                }
            }
        }

        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.stats
            .delivered
            .fetch_add(result.success_count as u64, Ordering::Relaxed);
        self.stats
            .failed
            .fetch_add(result.failures.len() as u64, Ordering::Relaxed);
        BroadcastMetrics::record_delivered(result.success_count as u64);
        BroadcastMetrics::record_broadcast(fanout, started.elapsed());

        tracing::debug!(
            delivered = result.success_count,
            failed = result.failures.len(),
            excluded = result.excluded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Broadcast completed"
        );

        if shutting_down {
            tracing::warn!(
                delivered = result.success_count,
                "Broadcast cut short, worker pool closed"
            );
            return Err(DispatchError::ShuttingDown);
        }

        Ok(result)
    }
}

/// One recipient's send, evicting the session on a terminal failure
async fn send_to_session(
    registry: &SessionRegistry,
    session: Arc<Session>,
    payload: Payload,
    send_timeout: Duration,
) -> SendOutcome {
    let result = match timeout(send_timeout, session.send(payload)).await {
        Ok(result) => result,
        Err(_) => Err(SendError::Timeout(send_timeout)),
    };

    let mut evicted = false;
    if let Err(ref error) = result {
        tracing::debug!(session_id = %session.id, error = %error, "Send failed");
        if error.is_terminal() {
            evicted = registry.deregister_session(&session);
            if evicted {
                tracing::warn!(
                    session_id = %session.id,
                    error = %error,
                    "Evicted session after terminal send failure"
                );
            }
        }
    }

    SendOutcome {
        session_id: session.id.clone(),
        result,
        evicted,
    }
}

/// A transport that panics is treated as broken
fn panicked_send(registry: &SessionRegistry, session: &Arc<Session>) -> SendOutcome {
    let evicted = registry.deregister_session(session);
    tracing::error!(session_id = %session.id, evicted, "Transport panicked during send");
    SendOutcome {
        session_id: session.id.clone(),
        result: Err(SendError::Panicked),
        evicted,
    }
}
