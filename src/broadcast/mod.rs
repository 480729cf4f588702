//! Broadcast fan-out: one payload in, one independent send per session out.

mod dispatcher;
mod types;

pub use dispatcher::{BroadcastDispatcher, DispatchError, DispatcherStats, DispatcherStatsSnapshot};
pub use types::{BroadcastRequest, BroadcastResult, SendFailure};
