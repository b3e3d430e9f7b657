//! Metrics for the three-tier pricing pipeline.

use metrics::{counter, gauge, histogram};

/// Pricing pipeline metrics recorder
pub struct PricingMetrics;

impl PricingMetrics {
    /// Record raw snapshots accepted into staging
    pub fn record_snapshots_ingested(count: usize) {
        counter!("pricing_snapshots_ingested_total").increment(count as u64);
    }

    /// Record a consolidation run start
    pub fn record_consolidation_started() {
        counter!("pricing_consolidation_runs_total", "status" => "started").increment(1);
    }

    /// Record a consolidation run completion with its counters
    pub fn record_consolidation_completed(
        snapshots_processed: usize,
        duplicates_removed: usize,
        gaps_filled: usize,
        backfills_added: usize,
        duration_secs: f64,
    ) {
        counter!("pricing_consolidation_runs_total", "status" => "completed").increment(1);
        histogram!("pricing_consolidation_duration_seconds").record(duration_secs);
        gauge!("pricing_gaps_filled_last_run").set(gaps_filled as f64);

        tracing::debug!(
            snapshots_processed,
            duplicates_removed,
            gaps_filled,
            backfills_added,
            "Consolidation run completed"
        );
    }

    /// Record a consolidation run failure
    pub fn record_consolidation_failed() {
        counter!("pricing_consolidation_runs_total", "status" => "failed").increment(1);
    }

    /// Record points fetched from the provider's historical price API
    pub fn record_backfill_points(count: usize) {
        counter!("pricing_backfill_points_total").increment(count as u64);
    }
}
