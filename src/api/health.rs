//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::broadcast::DispatcherStatsSnapshot;
use crate::server::AppState;
use crate::session::RegistryStats;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub registry: RegistryStats,
    pub dispatcher: DispatcherStatsSnapshot,
    pub worker_pool: WorkerPoolStats,
    pub pending_broadcasts: usize,
}

#[derive(Debug, Serialize)]
pub struct WorkerPoolStats {
    pub size: usize,
    pub idle: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.registry.is_closed() {
        "shutting_down"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        sessions: state.registry.len(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        registry: state.registry.stats(),
        dispatcher: state.dispatcher.stats(),
        worker_pool: WorkerPoolStats {
            size: state.dispatcher.pool_size(),
            idle: state.dispatcher.idle_workers(),
        },
        pending_broadcasts: state.trigger.pending(),
    })
}
