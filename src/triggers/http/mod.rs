//! HTTP broadcast trigger handlers
//!
//! - `GET /hi/{name}`: broadcast the path segment as text
//! - `POST /api/v1/broadcast`: broadcast a JSON payload with an optional exclusion list

mod handlers;
mod models;

pub use handlers::{broadcast_message, hi};
pub use models::{BroadcastAcceptedResponse, BroadcastMessageRequest};
