//! Prometheus metrics for the broadcast service.
//!
//! - Session metrics (active sessions, connection churn and duration)
//! - Broadcast metrics (fan-out size, deliveries, failures by reason, evictions)
//! - Trigger metrics (accepted and rejected requests)
//! - Heartbeat metrics

mod helpers;

pub use helpers::{encode_metrics, BroadcastMetrics, HeartbeatMetrics, TriggerMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "wsb";

lazy_static! {
    // ============================================================================
    // Session Metrics
    // ============================================================================

    /// Sessions currently present in the registry
    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_sessions_active", METRIC_PREFIX),
        "Number of sessions currently registered"
    ).unwrap();

    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// Connection lifetime
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    /// Client frames received over WebSocket
    pub static ref WS_MESSAGES_RECEIVED: IntCounter = register_int_counter!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Total frames received from WebSocket clients"
    ).unwrap();

    // ============================================================================
    // Broadcast Metrics
    // ============================================================================

    pub static ref BROADCASTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcasts_total", METRIC_PREFIX),
        "Total broadcasts dispatched"
    ).unwrap();

    /// Broadcasts aborted because the registry was unavailable
    pub static ref BROADCASTS_ABORTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcasts_aborted_total", METRIC_PREFIX),
        "Total broadcasts aborted before fan-out"
    ).unwrap();

    pub static ref SENDS_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sends_delivered_total", METRIC_PREFIX),
        "Total payloads delivered to sessions"
    ).unwrap();

    pub static ref SENDS_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_sends_failed_total", METRIC_PREFIX),
        "Total per-session send failures",
        &["reason"]
    ).unwrap();

    /// Sessions deregistered after a terminal send error
    pub static ref SESSIONS_EVICTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sessions_evicted_total", METRIC_PREFIX),
        "Total sessions evicted after terminal transport errors"
    ).unwrap();

    pub static ref BROADCAST_FANOUT: Histogram = register_histogram!(
        format!("{}_broadcast_fanout", METRIC_PREFIX),
        "Number of sessions targeted per broadcast",
        vec![0.0, 1.0, 10.0, 100.0, 1000.0, 10000.0]
    ).unwrap();

    pub static ref BROADCAST_DURATION: Histogram = register_histogram!(
        format!("{}_broadcast_duration_seconds", METRIC_PREFIX),
        "Time from snapshot to last send completion",
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    // ============================================================================
    // Trigger Metrics
    // ============================================================================

    pub static ref TRIGGER_ACCEPTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_trigger_accepted_total", METRIC_PREFIX),
        "Total broadcast requests accepted by the inbound trigger"
    ).unwrap();

    pub static ref TRIGGER_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_trigger_rejected_total", METRIC_PREFIX),
        "Total broadcast requests rejected by the inbound trigger",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    pub static ref HEARTBEAT_PINGS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_heartbeat_pings_total", METRIC_PREFIX),
        "Heartbeat pings by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref IDLE_SESSIONS_REMOVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_idle_sessions_removed_total", METRIC_PREFIX),
        "Total sessions removed for inactivity"
    ).unwrap();
}
