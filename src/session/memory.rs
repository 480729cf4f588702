//! In-memory loopback transport
//!
//! Delivers payloads to an unbounded channel instead of a socket. Failures and
//! latency can be injected, which makes it the transport of choice for tests
//! and for embedding the registry without a network listener.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Payload, SendError, SessionTransport};

pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<Payload>,
    failure: Mutex<Option<SendError>>,
    latency: Mutex<Option<Duration>>,
    closed: AtomicBool,
    pings: AtomicUsize,
}

impl MemoryTransport {
    /// Create a transport and the receiving end of its delivered payloads
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            tx,
            failure: Mutex::new(None),
            latency: Mutex::new(None),
            closed: AtomicBool::new(false),
            pings: AtomicUsize::new(0),
        };
        (transport, rx)
    }

    /// Make every following send and ping fail with `error`
    pub fn fail_with(&self, error: SendError) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Delay every following send by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = Some(latency);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        match self.failure.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SessionTransport for MemoryTransport {
    async fn send(&self, payload: Payload) -> Result<(), SendError> {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.check()?;
        self.tx.send(payload).map_err(|_| SendError::Closed)
    }

    async fn ping(&self) -> Result<(), SendError> {
        self.check()?;
        self.pings.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
