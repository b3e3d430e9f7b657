//! Metrics for the switch lifecycle: commands, completions, agent liveness.

use metrics::{counter, gauge, histogram};

/// Switching metrics recorder
pub struct SwitchMetrics;

impl SwitchMetrics {
    /// Record a switch command being enqueued
    pub fn record_switch_enqueued(trigger: &str, target_mode: &str) {
        counter!(
            "switch_commands_total",
            "trigger" => trigger.to_string(),
            "target_mode" => target_mode.to_string()
        )
        .increment(1);
    }

    /// Record a completed switch as reported by the agent
    pub fn record_switch_completed(new_mode: &str, trigger: &str, downtime_seconds: f64) {
        counter!(
            "switches_completed_total",
            "new_mode" => new_mode.to_string(),
            "trigger" => trigger.to_string()
        )
        .increment(1);
        histogram!("switch_downtime_seconds", "trigger" => trigger.to_string())
            .record(downtime_seconds);
    }

    /// Record a rejected execution report (id/mode mismatch)
    pub fn record_report_rejected(reason: &str) {
        counter!("switch_reports_rejected_total", "reason" => reason.to_string()).increment(1);
    }

    /// Set the number of agents currently online for a mode
    pub fn set_agents_online(mode: &str, count: usize) {
        gauge!("agents_online_total", "mode" => mode.to_string()).set(count as f64);
    }

    /// Record a zombie purge pass
    pub fn record_zombies_terminated(count: usize) {
        counter!("zombies_terminated_total").increment(count as u64);
    }
}
