use std::sync::Arc;
use std::time::Instant;

use crate::broadcast::BroadcastDispatcher;
use crate::config::Settings;
use crate::session::SessionRegistry;
use crate::triggers::{BroadcastWorker, InboundTrigger};

/// Shared handles for request handlers. One registry instance is built here
/// and passed to every component that needs it.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Arc<BroadcastDispatcher>,
    pub trigger: InboundTrigger,
    pub start_time: Instant,
}

impl AppState {
    /// Build the state and the broadcast worker the caller must spawn
    pub fn new(settings: Settings) -> (Self, BroadcastWorker) {
        let registry = Arc::new(SessionRegistry::with_capacity_limit(
            settings.websocket.max_sessions,
        ));
        let dispatcher = Arc::new(BroadcastDispatcher::new(
            registry.clone(),
            &settings.dispatcher,
        ));
        let (trigger, worker) =
            InboundTrigger::channel(dispatcher.clone(), settings.dispatcher.queue_capacity);

        let state = Self {
            settings: Arc::new(settings),
            registry,
            dispatcher,
            trigger,
            start_time: Instant::now(),
        };
        (state, worker)
    }
}
