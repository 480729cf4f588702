//! Per-connection state machine
//!
//! `CONNECTING -> OPEN -> {CLOSING -> CLOSED | ERROR -> CLOSED}`
//!
//! The transport layer drives transitions; this type only reacts by
//! registering, deregistering and releasing the transport.

use std::sync::Arc;

use crate::session::{RegistryError, Session, SessionId, SessionRegistry, SessionTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Error,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {event} a connection in state {from:?}")]
    InvalidTransition {
        from: ConnectionState,
        event: &'static str,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub struct ConnectionLifecycle {
    registry: Arc<SessionRegistry>,
    session_id: SessionId,
    transport: Arc<dyn SessionTransport>,
    state: ConnectionState,
    session: Option<Arc<Session>>,
}

impl ConnectionLifecycle {
    pub fn new(
        registry: Arc<SessionRegistry>,
        session_id: impl Into<SessionId>,
        transport: Arc<dyn SessionTransport>,
    ) -> Self {
        Self {
            registry,
            session_id: session_id.into(),
            transport,
            state: ConnectionState::Connecting,
            session: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    /// Handshake completed: register the session.
    ///
    /// A rejected registration releases the transport and ends in CLOSED.
    pub async fn on_open(&mut self) -> Result<Arc<Session>, LifecycleError> {
        if self.state != ConnectionState::Connecting {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                event: "open",
            });
        }

        match self
            .registry
            .register(self.session_id.clone(), self.transport.clone())
        {
            Ok(session) => {
                self.state = ConnectionState::Open;
                self.session = Some(session.clone());
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Session registration rejected");
                self.state = ConnectionState::Error;
                self.release().await;
                Err(e.into())
            }
        }
    }

    /// Orderly close from either side. No-op once CLOSED.
    pub async fn on_closing(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closing;
        if let Some(session) = &self.session {
            session.mark_closing();
        }
        self.release().await;
    }

    /// Transport failure. No-op once CLOSED.
    pub async fn on_error(&mut self, reason: &str) {
        if self.state == ConnectionState::Closed {
            return;
        }
        tracing::warn!(session_id = %self.session_id, reason = %reason, "Connection error");
        self.state = ConnectionState::Error;
        self.release().await;
    }

    async fn release(&mut self) {
        if let Some(session) = &self.session {
            // Only removes our own entry; a dispatcher eviction may have won
            self.registry.deregister_session(session);
        }
        self.transport.close().await;
        self.state = ConnectionState::Closed;
    }
}
