//! Metrics for emergency preemption handling.

use metrics::{counter, gauge, histogram};

/// Emergency orchestrator metrics recorder
pub struct EmergencyMetrics;

impl EmergencyMetrics {
    /// Record an inbound preemption notice
    pub fn record_notice(kind: &str) {
        counter!("emergency_notices_total", "kind" => kind.to_string()).increment(1);
    }

    /// Record an emergency promotion outcome
    pub fn record_promotion(outcome: &str, health_check_skipped: bool) {
        counter!(
            "emergency_promotions_total",
            "outcome" => outcome.to_string(),
            "health_check_skipped" => health_check_skipped.to_string()
        )
        .increment(1);
    }

    /// Record observed notice-to-promotion latency
    pub fn record_failover_latency(kind: &str, seconds: f64) {
        histogram!("emergency_failover_seconds", "kind" => kind.to_string()).record(seconds);
    }

    /// Record agents escalated past their notice deadline
    pub fn record_escalations(count: usize) {
        counter!("emergency_escalations_total").increment(count as u64);
    }

    /// Set the number of standing replicas for a kind
    pub fn set_replicas_active(kind: &str, count: usize) {
        gauge!("replicas_active_total", "kind" => kind.to_string()).set(count as f64);
    }
}
