//! WebSocket endpoint: upgrade handling, per-connection lifecycle and the
//! socket-backed session transport.

mod handler;
mod lifecycle;
mod transport;

pub use handler::ws_handler;
pub use lifecycle::{ConnectionLifecycle, ConnectionState, LifecycleError};
pub use transport::{write_frames, OutboundFrame, WsTransport};
