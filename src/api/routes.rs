use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;
use crate::triggers::{broadcast_message, hi};

use super::health::{health, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Inbound trigger
        .route("/hi/{name}", get(hi))
        .nest(
            "/api/v1",
            Router::new().route("/broadcast", post(broadcast_message)),
        )
}
