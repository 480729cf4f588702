use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::metrics::SESSIONS_ACTIVE;

use super::{Session, SessionId, SessionTransport};

/// Default upper bound on concurrently registered sessions
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("session {0} is already registered")]
    DuplicateSession(SessionId),

    #[error("session limit exceeded ({current}/{max})")]
    CapacityExceeded { current: usize, max: usize },

    #[error("session registry is unavailable")]
    Unavailable,
}

/// Authoritative in-memory set of open sessions
pub struct SessionRegistry {
    /// session_id -> Session
    sessions: DashMap<SessionId, Arc<Session>>,
    /// Slots reserved against `max_sessions`; tracks `sessions.len()`
    reserved: AtomicUsize,
    max_sessions: usize,
    closed: AtomicBool,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_capacity_limit(DEFAULT_MAX_SESSIONS)
    }

    pub fn with_capacity_limit(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            reserved: AtomicUsize::new(0),
            max_sessions,
            closed: AtomicBool::new(false),
        }
    }

    /// Register a new session. The existing session wins on a duplicate id,
    /// even when the registry is at capacity.
    pub fn register(
        &self,
        id: impl Into<SessionId>,
        transport: Arc<dyn SessionTransport>,
    ) -> Result<Arc<Session>, RegistryError> {
        if self.is_closed() {
            return Err(RegistryError::Unavailable);
        }

        let id = id.into();
        let session = match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(session_id = %id, "Rejected duplicate session registration");
                return Err(RegistryError::DuplicateSession(id));
            }
            Entry::Vacant(slot) => {
                // sessions.len() would read-lock the shard this entry holds
                self.reserve_slot()?;
                let session = Arc::new(Session::new(id, transport));
                slot.insert(session.clone());
                SESSIONS_ACTIVE.inc();
                session
            }
        };

        // close() may have collected its drain list before this insert
        if self.is_closed() {
            self.deregister_session(&session);
            return Err(RegistryError::Unavailable);
        }

        tracing::info!(session_id = %session.id, "Session registered");
        Ok(session)
    }

    fn reserve_slot(&self) -> Result<(), RegistryError> {
        let max = self.max_sessions;
        self.reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .map(|_| ())
            .map_err(|current| {
                tracing::warn!(current, max, "Session limit reached");
                RegistryError::CapacityExceeded { current, max }
            })
    }

    /// Remove a session by id. Absent ids are a no-op.
    pub fn deregister(&self, id: &str) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(id)?;
        self.on_removed(&session);
        Some(session)
    }

    /// Remove `session` only if it is still the entry registered under its id
    pub fn deregister_session(&self, session: &Arc<Session>) -> bool {
        match self
            .sessions
            .remove_if(&session.id, |_, current| Arc::ptr_eq(current, session))
        {
            Some((_, removed)) => {
                self.on_removed(&removed);
                true
            }
            None => false,
        }
    }

    fn on_removed(&self, session: &Session) {
        session.mark_closed();
        self.reserved.fetch_sub(1, Ordering::SeqCst);
        SESSIONS_ACTIVE.dec();
        tracing::info!(session_id = %session.id, "Session deregistered");
    }

    /// Point-in-time copy of all registered sessions
    pub fn snapshot(&self) -> Result<Vec<Arc<Session>>, RegistryError> {
        if self.is_closed() {
            return Err(RegistryError::Unavailable);
        }
        Ok(self.sessions.iter().map(|r| r.value().clone()).collect())
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|r| r.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_sessions: self.sessions.len(),
            max_sessions: self.max_sessions,
            accepting: !self.is_closed(),
        }
    }

    /// Sessions with no activity for longer than `timeout_secs`
    pub fn find_stale(&self, timeout_secs: u64) -> Vec<Arc<Session>> {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.sessions
            .iter()
            .filter(|r| now.signed_duration_since(r.value().last_activity()) > timeout)
            .map(|r| r.value().clone())
            .collect()
    }

    /// Stop accepting sessions and drain every registered one
    pub fn close(&self) -> Vec<Arc<Session>> {
        self.closed.store(true, Ordering::SeqCst);

        let ids: Vec<SessionId> = self.sessions.iter().map(|r| r.key().clone()).collect();
        let drained: Vec<Arc<Session>> = ids.iter().filter_map(|id| self.deregister(id)).collect();

        tracing::info!(drained = drained.len(), "Session registry closed");
        drained
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_sessions: usize,
    pub max_sessions: usize,
    pub accepting: bool,
}
