//! Observability utilities for the spot/on-demand switching control plane.
//!
//! This crate provides:
//! - Prometheus metrics recording and export
//! - Custom metrics for switching, pricing, and emergency operations
//! - Axum middleware for automatic request metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use observability::{init_metrics, metrics_handler, SwitchMetrics};
//!
//! // Initialize metrics recorder
//! init_metrics();
//!
//! // Record switching operations
//! SwitchMetrics::record_switch_completed("spot", "manual", 41.0);
//!
//! // Add metrics endpoint to router
//! let app = Router::new()
//!     .route("/metrics", get(metrics_handler));
//! ```

pub mod emergency;
pub mod middleware;
pub mod pricing;
pub mod switching;

pub use emergency::EmergencyMetrics;
pub use pricing::PricingMetrics;
pub use switching::SwitchMetrics;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup.
/// Returns the PrometheusHandle for rendering metrics.
pub fn init_metrics() -> &'static PrometheusHandle {
    METRICS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        info!("Prometheus metrics recorder initialized");

        // Register metric descriptions
        register_metric_descriptions();

        handle
    })
}

/// Get the metrics handle (must call init_metrics first)
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Axum handler for /metrics endpoint
pub async fn metrics_handler() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

/// Register metric descriptions for documentation
fn register_metric_descriptions() {
    use metrics::describe_counter;
    use metrics::describe_gauge;
    use metrics::describe_histogram;

    // HTTP metrics
    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "http_requests_errors_total",
        "Total number of HTTP request errors"
    );

    // Switching metrics
    describe_counter!(
        "switch_commands_total",
        "Switch commands enqueued by trigger"
    );
    describe_counter!(
        "switches_completed_total",
        "Completed switches by target mode and trigger"
    );
    describe_histogram!(
        "switch_downtime_seconds",
        "Reported downtime of completed switches"
    );
    describe_gauge!(
        "agents_online_total",
        "Agents currently online by mode"
    );

    // Pricing metrics
    describe_counter!(
        "pricing_snapshots_ingested_total",
        "Raw price snapshots accepted into staging"
    );
    describe_counter!(
        "pricing_consolidation_runs_total",
        "Consolidation job executions by status"
    );
    describe_histogram!(
        "pricing_consolidation_duration_seconds",
        "Consolidation job duration"
    );
    describe_gauge!(
        "pricing_gaps_filled_last_run",
        "Interpolated points produced by the last consolidation run"
    );

    // Emergency metrics
    describe_counter!(
        "emergency_notices_total",
        "Rebalance and termination notices received"
    );
    describe_counter!(
        "emergency_promotions_total",
        "Emergency promotions by outcome"
    );
    describe_histogram!(
        "emergency_failover_seconds",
        "Observed time from notice to promotion"
    );

    // Lifecycle metrics
    describe_counter!(
        "zombies_terminated_total",
        "Zombie instances purged by the retention job"
    );
    describe_gauge!(
        "replicas_active_total",
        "Standing replicas by kind"
    );
}
