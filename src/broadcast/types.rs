use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::session::{Payload, SendError, SessionId};

/// One payload to deliver to every registered session
#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    pub id: Uuid,
    pub payload: Payload,
    /// Sessions that must not receive this payload
    pub exclude: HashSet<SessionId>,
    pub created_at: DateTime<Utc>,
}

impl BroadcastRequest {
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: payload.into(),
            exclude: HashSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn excluding<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SessionId>,
    {
        self.exclude.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn is_excluded(&self, session_id: &str) -> bool {
        self.exclude.contains(session_id)
    }
}

/// A session that did not receive the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendFailure {
    pub session_id: SessionId,
    pub error: SendError,
}

/// Outcome of a single broadcast
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastResult {
    pub broadcast_id: Uuid,
    /// Sessions that received the full payload
    pub success_count: usize,
    pub failures: Vec<SendFailure>,
    /// Sessions skipped through the exclusion set
    pub excluded: usize,
}

impl BroadcastResult {
    pub(crate) fn empty(broadcast_id: Uuid) -> Self {
        Self {
            broadcast_id,
            success_count: 0,
            failures: Vec::new(),
            excluded: 0,
        }
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Number of sessions a send was attempted on
    pub fn attempted(&self) -> usize {
        self.success_count + self.failures.len()
    }

    pub fn all_delivered(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.session_id.as_str()).collect()
    }
}
