// Supporting infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Domain layer
pub mod broadcast;
pub mod session;

// Application layer
pub mod api;
pub mod server;
pub mod triggers;
pub mod websocket;

// Background work
pub mod shutdown;
pub mod tasks;
