use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::broadcast::{BroadcastDispatcher, BroadcastRequest};
use crate::metrics::TriggerMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    #[error("broadcast payload must not be empty")]
    EmptyPayload,

    #[error("broadcast queue is full")]
    QueueFull,

    #[error("broadcast worker is not running")]
    Closed,
}

impl TriggerError {
    fn reason(&self) -> &'static str {
        match self {
            Self::EmptyPayload => "empty_payload",
            Self::QueueFull => "queue_full",
            Self::Closed => "closed",
        }
    }
}

/// Entry point that turns an inbound value into a broadcast.
///
/// Submission is fire-and-forget: the request is queued for the
/// [`BroadcastWorker`] and the caller never learns about delivery failures.
#[derive(Clone)]
pub struct InboundTrigger {
    queue: mpsc::Sender<BroadcastRequest>,
}

impl InboundTrigger {
    /// Create a trigger and the worker that drains its queue into `dispatcher`
    pub fn channel(
        dispatcher: Arc<BroadcastDispatcher>,
        capacity: usize,
    ) -> (Self, BroadcastWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = BroadcastWorker {
            requests: rx,
            dispatcher,
        };
        (Self { queue: tx }, worker)
    }

    /// Broadcast `path_value` as a text payload
    #[tracing::instrument(
        name = "trigger.handle_request",
        skip(self, path_value),
        fields(payload_len = path_value.len())
    )]
    pub fn handle_request(&self, path_value: &str) -> Result<Uuid, TriggerError> {
        self.submit(BroadcastRequest::new(path_value))
    }

    /// Queue a prepared request. Returns as soon as it is queued.
    pub fn submit(&self, request: BroadcastRequest) -> Result<Uuid, TriggerError> {
        if request.payload.is_empty() {
            return Err(self.reject(TriggerError::EmptyPayload));
        }

        let broadcast_id = request.id;
        match self.queue.try_send(request) {
            Ok(()) => {
                TriggerMetrics::record_accepted();
                tracing::debug!(broadcast_id = %broadcast_id, "Broadcast request queued");
                Ok(broadcast_id)
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(self.reject(TriggerError::QueueFull)),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(self.reject(TriggerError::Closed)),
        }
    }

    /// Requests waiting for the worker
    pub fn pending(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    fn reject(&self, error: TriggerError) -> TriggerError {
        TriggerMetrics::record_rejected(error.reason());
        tracing::warn!(error = %error, "Broadcast request rejected");
        error
    }
}

/// Drains queued requests into the dispatcher one broadcast at a time, so
/// every session sees trigger broadcasts in submission order.
pub struct BroadcastWorker {
    requests: mpsc::Receiver<BroadcastRequest>,
    dispatcher: Arc<BroadcastDispatcher>,
}

impl BroadcastWorker {
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Broadcast worker started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Broadcast worker received shutdown signal");
                    break;
                }
                request = self.requests.recv() => match request {
                    Some(request) => self.process(request).await,
                    None => break,
                },
            }
        }

        tracing::info!("Broadcast worker stopped");
    }

    async fn process(&self, request: BroadcastRequest) {
        let broadcast_id = request.id;
        match self.dispatcher.broadcast(request).await {
            Ok(result) if result.all_delivered() => {
                tracing::debug!(
                    broadcast_id = %broadcast_id,
                    delivered = result.success_count,
                    "Broadcast delivered"
                );
            }
            Ok(result) => {
                tracing::warn!(
                    broadcast_id = %broadcast_id,
                    delivered = result.success_count,
                    failed = result.failure_count(),
                    failed_sessions = ?result.failed_ids(),
                    "Broadcast partially delivered"
                );
            }
            Err(e) => {
                tracing::error!(broadcast_id = %broadcast_id, error = %e, "Broadcast failed");
            }
        }
    }
}
