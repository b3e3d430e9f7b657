use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::PricingResult;
use crate::models::{
    CanonicalPrice, ConsolidatedPrice, ConsolidationRun, NewCanonicalPrice, NewConsolidatedPrice,
    NewSnapshot, Pool, PoolKey, RunCounters, SpotPriceSnapshot,
};

/// Repository trait for pools and the three pricing tiers
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait PricingRepository: Send + Sync {
    // ------------------------------------------------------------------ pools

    /// Find or create the pool for a key
    async fn upsert_pool(&self, key: PoolKey) -> PricingResult<Pool>;

    async fn pool_by_id(&self, id: Uuid) -> PricingResult<Option<Pool>>;

    async fn pool_by_key(&self, key: PoolKey) -> PricingResult<Option<Pool>>;

    /// Pools, optionally narrowed to a region
    async fn list_pools(&self, region: Option<String>) -> PricingResult<Vec<Pool>>;

    /// Fold one boot-time sample into the pool's rolling mean
    async fn record_boot_sample(&self, pool_id: Uuid, boot_seconds: f64) -> PricingResult<Pool>;

    // ---------------------------------------------------------------- staging

    /// Append raw snapshots; no deduplication at write time
    async fn insert_snapshots(&self, snapshots: Vec<NewSnapshot>) -> PricingResult<usize>;

    /// Non-duplicate snapshots with observed_at in [from, to), oldest first
    async fn snapshots_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PricingResult<Vec<SpotPriceSnapshot>>;

    /// Flag losers of the per-bucket dedup
    async fn mark_snapshots_duplicate(&self, ids: Vec<i64>) -> PricingResult<u64>;

    // ----------------------------------------------------------- consolidated

    /// Insert-or-replace consolidated points on (pool_id, observed_at)
    async fn upsert_consolidated(&self, points: Vec<NewConsolidatedPrice>) -> PricingResult<usize>;

    /// Consolidated points for one pool in [from, to), oldest first
    async fn consolidated_for_pool(
        &self,
        pool_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PricingResult<Vec<ConsolidatedPrice>>;

    /// Most recent consolidated price per pool for an (instance_type, region),
    /// considering only points observed at or after `since`
    async fn latest_prices_for_region(
        &self,
        instance_type: String,
        region: String,
        since: DateTime<Utc>,
    ) -> PricingResult<Vec<(Pool, ConsolidatedPrice)>>;

    // -------------------------------------------------------------- canonical

    /// Insert-or-replace canonical points on (pool_id, observed_at)
    async fn upsert_canonical(&self, points: Vec<NewCanonicalPrice>) -> PricingResult<usize>;

    /// Canonical series for one pool in [from, to), oldest first
    async fn canonical_history(
        &self,
        pool_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PricingResult<Vec<CanonicalPrice>>;

    // ------------------------------------------------------------------- jobs

    /// Open a tracking row for a consolidation execution
    async fn create_run(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> PricingResult<ConsolidationRun>;

    /// Close a run as completed with its counters
    async fn complete_run(&self, run_id: Uuid, counters: RunCounters) -> PricingResult<()>;

    /// Close a run as failed, recording the error
    async fn fail_run(&self, run_id: Uuid, error: String) -> PricingResult<()>;

    /// The most recent completed run, if any; the next window starts where
    /// it stopped
    async fn last_completed_run(&self) -> PricingResult<Option<ConsolidationRun>>;

    /// Recent runs for the admin surface, newest first
    async fn list_runs(&self, limit: u64) -> PricingResult<Vec<ConsolidationRun>>;
}
