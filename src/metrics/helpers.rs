//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    BROADCASTS_ABORTED_TOTAL, BROADCASTS_TOTAL, BROADCAST_DURATION, BROADCAST_FANOUT,
    HEARTBEAT_PINGS_TOTAL, IDLE_SESSIONS_REMOVED_TOTAL, SENDS_DELIVERED_TOTAL,
    SENDS_FAILED_TOTAL, SESSIONS_EVICTED_TOTAL, TRIGGER_ACCEPTED_TOTAL, TRIGGER_REJECTED_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording broadcast metrics
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    /// Record a completed broadcast
    pub fn record_broadcast(fanout: usize, elapsed: Duration) {
        BROADCASTS_TOTAL.inc();
        BROADCAST_FANOUT.observe(fanout as f64);
        BROADCAST_DURATION.observe(elapsed.as_secs_f64());
    }

    pub fn record_aborted() {
        BROADCASTS_ABORTED_TOTAL.inc();
    }

    pub fn record_delivered(count: u64) {
        SENDS_DELIVERED_TOTAL.inc_by(count);
    }

    /// Record a failed send by reason label
    pub fn record_failed(reason: &str) {
        SENDS_FAILED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn record_evicted() {
        SESSIONS_EVICTED_TOTAL.inc();
    }
}

/// Helper struct for recording inbound trigger metrics
pub struct TriggerMetrics;

impl TriggerMetrics {
    pub fn record_accepted() {
        TRIGGER_ACCEPTED_TOTAL.inc();
    }

    pub fn record_rejected(reason: &str) {
        TRIGGER_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }
}

/// Helper struct for recording heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_pings(sent: u64, failed: u64, timed_out: u64) {
        HEARTBEAT_PINGS_TOTAL.with_label_values(&["sent"]).inc_by(sent);
        HEARTBEAT_PINGS_TOTAL.with_label_values(&["failed"]).inc_by(failed);
        HEARTBEAT_PINGS_TOTAL.with_label_values(&["timeout"]).inc_by(timed_out);
    }

    pub fn record_idle_removed(count: u64) {
        IDLE_SESSIONS_REMOVED_TOTAL.inc_by(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_broadcast_metrics() {
        BroadcastMetrics::record_failed("io");
        TriggerMetrics::record_rejected("empty_payload");

        let output = encode_metrics().unwrap();
        assert!(output.contains("wsb_sends_failed_total"));
        assert!(output.contains("wsb_trigger_rejected_total"));
    }
}
