//! Session handle, transport seam and send errors

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Opaque session identifier, unique for the lifetime of a connection
pub type SessionId = String;

/// Status of a registered session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Open,
    Closing,
    Closed,
}

impl SessionStatus {
    fn as_u8(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Closing => 1,
            Self::Closed => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Message body delivered to sessions. Clones share the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(Arc<str>),
    Binary(Arc<[u8]>),
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(Arc::from(text.into()))
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Binary(Arc::from(bytes.into()))
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(Arc::from(text))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

/// Failure of a single per-session send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SendError {
    #[error("session is not open")]
    NotOpen,
    #[error("transport closed")]
    Closed,
    #[error("transport write failed: {0}")]
    Io(String),
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport panicked during send")]
    Panicked,
}

impl SendError {
    /// A terminal error means the session can never be written to again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Timeout(_))
    }

    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotOpen => "not_open",
            Self::Closed => "closed",
            Self::Io(_) => "io",
            Self::Timeout(_) => "timeout",
            Self::Panicked => "panicked",
        }
    }
}

/// Outbound half of a connection.
///
/// Implementations must write each payload as one whole frame and must
/// serialize concurrent `send` calls so frames never interleave.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Deliver one payload. Resolves once the frame is written or failed.
    async fn send(&self, payload: Payload) -> Result<(), SendError>;

    /// Liveness probe used by the heartbeat task
    async fn ping(&self) -> Result<(), SendError> {
        Ok(())
    }

    /// Release the transport. Must be safe to call more than once.
    async fn close(&self);
}

/// A registered WebSocket session
pub struct Session {
    pub id: SessionId,
    pub connected_at: DateTime<Utc>,
    transport: Arc<dyn SessionTransport>,
    status: AtomicU8,
    /// Unix seconds, lock-free updates from the read loop
    last_activity: AtomicI64,
}

impl Session {
    pub fn new(id: impl Into<SessionId>, transport: Arc<dyn SessionTransport>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            connected_at: now,
            transport,
            status: AtomicU8::new(SessionStatus::Open.as_u8()),
            last_activity: AtomicI64::new(now.timestamp()),
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.status() == SessionStatus::Open
    }

    /// Move OPEN -> CLOSING. Returns false if the session was not open.
    pub fn mark_closing(&self) -> bool {
        self.status
            .compare_exchange(
                SessionStatus::Open.as_u8(),
                SessionStatus::Closing.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn mark_closed(&self) {
        self.status
            .store(SessionStatus::Closed.as_u8(), Ordering::Release);
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&self, at: DateTime<Utc>) {
        self.last_activity.store(at.timestamp(), Ordering::Relaxed);
    }

    pub fn transport(&self) -> Arc<dyn SessionTransport> {
        self.transport.clone()
    }

    /// Send a payload if the session is still open
    pub async fn send(&self, payload: Payload) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen);
        }
        self.transport.send(payload).await
    }

    pub async fn ping(&self) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen);
        }
        self.transport.ping().await
    }

    /// Mark the session closed and release its transport
    pub async fn close(&self) {
        self.mark_closed();
        self.transport.close().await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("connected_at", &self.connected_at)
            .finish()
    }
}
