//! Session registry: the set of currently open WebSocket sessions.

mod memory;
mod registry;
mod types;

pub use memory::MemoryTransport;
pub use registry::{RegistryError, RegistryStats, SessionRegistry, DEFAULT_MAX_SESSIONS};
pub use types::{Payload, SendError, Session, SessionId, SessionStatus, SessionTransport};
