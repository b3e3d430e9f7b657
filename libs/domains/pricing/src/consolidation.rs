//! The 12-hour consolidation job: staging → consolidated → canonical.
//!
//! Each execution is tracked in `consolidation_runs`; a failed run records
//! its error and the next run re-covers the same window, because the window
//! start is derived from the last *completed* run.

use chrono::{DateTime, Duration, DurationRound, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backfill::BackfillProvider;
use crate::error::{PricingError, PricingResult};
use crate::models::{
    NewCanonicalPrice, NewConsolidatedPrice, PriceSource, RunCounters, SpotPriceSnapshot,
};
use crate::repository::PricingRepository;

/// Raw snapshots are deduplicated per (pool, minute) bucket.
const BUCKET_MINUTES: i64 = 1;

/// Expected reporting cadence; a hole longer than this is a gap.
const GAP_STEP_MINUTES: i64 = 5;

/// Interior gaps up to this span are interpolated; anything wider is left
/// for the provider backfill (no agent was present to report).
const MAX_INTERPOLATION_SPAN_MINUTES: i64 = 60;

/// Backfill looks at most this far back.
const BACKFILL_DAYS: i64 = 7;

/// Trailing points used for the canonical volatility index.
const VOLATILITY_WINDOW: usize = 12;

/// Consolidation job runner
pub struct Consolidator<R: PricingRepository> {
    repository: Arc<R>,
    backfill: Option<Arc<dyn BackfillProvider>>,
    horizon_hours: i64,
}

impl<R: PricingRepository> Consolidator<R> {
    pub fn new(repository: Arc<R>, backfill: Option<Arc<dyn BackfillProvider>>) -> Self {
        Self {
            repository,
            backfill,
            horizon_hours: 12,
        }
    }

    pub fn with_horizon_hours(mut self, hours: i64) -> Self {
        self.horizon_hours = hours;
        self
    }

    /// Execute one consolidation run over the window since the last completed
    /// run. Cancellation is cooperative: the shutdown flag is checked between
    /// pools, and a cancelled run is recorded as failed so the next run picks
    /// the window up again.
    pub async fn run(
        &self,
        mut shutdown: Option<watch::Receiver<bool>>,
    ) -> PricingResult<RunCounters> {
        let window_end = Utc::now();
        let window_start = match self.repository.last_completed_run().await? {
            Some(last) => last.window_end,
            None => window_end - Duration::hours(self.horizon_hours),
        };

        let run = self.repository.create_run(window_start, window_end).await?;
        info!(
            run_id = %run.id,
            window_start = %window_start,
            window_end = %window_end,
            "Starting consolidation run"
        );

        match self
            .process_window(window_start, window_end, &mut shutdown)
            .await
        {
            Ok(counters) => {
                self.repository.complete_run(run.id, counters).await?;
                info!(
                    run_id = %run.id,
                    snapshots = counters.snapshots_processed,
                    duplicates = counters.duplicates_removed,
                    gaps = counters.gaps_filled,
                    backfills = counters.backfills_added,
                    "Consolidation run completed"
                );
                Ok(counters)
            }
            Err(e) => {
                self.repository.fail_run(run.id, e.to_string()).await?;
                warn!(run_id = %run.id, "Consolidation run failed: {}", e);
                Err(e)
            }
        }
    }

    async fn process_window(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        shutdown: &mut Option<watch::Receiver<bool>>,
    ) -> PricingResult<RunCounters> {
        let mut counters = RunCounters::default();

        let snapshots = self
            .repository
            .snapshots_in_window(window_start, window_end)
            .await?;
        counters.snapshots_processed = snapshots.len() as i32;

        let mut by_pool: BTreeMap<Uuid, Vec<SpotPriceSnapshot>> = BTreeMap::new();
        for snapshot in snapshots {
            by_pool.entry(snapshot.pool_id).or_default().push(snapshot);
        }

        for (pool_id, pool_snapshots) in by_pool {
            if let Some(rx) = shutdown
                && *rx.borrow()
            {
                return Err(PricingError::Internal(
                    "consolidation cancelled by shutdown".to_string(),
                ));
            }

            let (mut points, duplicate_ids) = deduplicate(pool_id, pool_snapshots);
            counters.duplicates_removed += duplicate_ids.len() as i32;
            self.repository
                .mark_snapshots_duplicate(duplicate_ids)
                .await?;

            let fills = plan_gap_fill(
                &points,
                Duration::minutes(GAP_STEP_MINUTES),
                Duration::minutes(MAX_INTERPOLATION_SPAN_MINUTES),
            );
            counters.gaps_filled += fills.len() as i32;
            points.extend(fills);
            points.sort_by_key(|p| p.observed_at);

            self.repository.upsert_consolidated(points.clone()).await?;

            if self.backfill.is_some() {
                counters.backfills_added += self.backfill_pool(pool_id, window_end).await? as i32;
            }

            self.derive_canonical(pool_id, window_start, window_end)
                .await?;

            debug!(pool_id = %pool_id, points = points.len(), "Pool consolidated");
        }

        Ok(counters)
    }

    /// Cover holes in the last 7 days where no agent was present, using the
    /// provider's historical spot-price API.
    async fn backfill_pool(
        &self,
        pool_id: Uuid,
        window_end: DateTime<Utc>,
    ) -> PricingResult<usize> {
        let provider = match &self.backfill {
            Some(provider) => provider.clone(),
            None => return Ok(0),
        };

        let pool = self
            .repository
            .pool_by_id(pool_id)
            .await?
            .ok_or_else(|| PricingError::NotFound(format!("pool {}", pool_id)))?;
        let key = crate::models::PoolKey::new(&pool.instance_type, &pool.region, &pool.az);

        let lookback_start = window_end - Duration::days(BACKFILL_DAYS);
        let existing = self
            .repository
            .consolidated_for_pool(pool_id, lookback_start, window_end)
            .await?;

        let holes = find_holes(
            lookback_start,
            window_end,
            &existing.iter().map(|p| p.observed_at).collect::<Vec<_>>(),
            Duration::minutes(MAX_INTERPOLATION_SPAN_MINUTES),
        );

        let mut added = 0;
        for (from, to) in holes {
            let fetched = provider.historical_prices(&key, from, to).await?;
            if fetched.is_empty() {
                continue;
            }

            let points: Vec<NewConsolidatedPrice> = fetched
                .into_iter()
                .map(|(observed_at, price)| NewConsolidatedPrice {
                    pool_id,
                    observed_at: bucket_floor(observed_at, Duration::minutes(BUCKET_MINUTES)),
                    price,
                    is_interpolated: false,
                    source_count: 0,
                    data_source: PriceSource::Backfill,
                })
                .collect();

            added += self.repository.upsert_consolidated(points).await?;
        }

        Ok(added)
    }

    /// Project the window's consolidated points into the canonical tier with
    /// confidence and volatility derived columns.
    async fn derive_canonical(
        &self,
        pool_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> PricingResult<()> {
        // Pull extra trailing context so the first points of the window get a
        // meaningful volatility index
        let context_start =
            window_start - Duration::minutes(GAP_STEP_MINUTES * VOLATILITY_WINDOW as i64);
        let series = self
            .repository
            .consolidated_for_pool(pool_id, context_start, window_end)
            .await?;

        let mut canonical = Vec::new();
        for (idx, point) in series.iter().enumerate() {
            if point.observed_at < window_start {
                continue;
            }

            let trailing_start = idx.saturating_sub(VOLATILITY_WINDOW - 1);
            let trailing: Vec<f64> = series[trailing_start..=idx].iter().map(|p| p.price).collect();

            canonical.push(NewCanonicalPrice {
                pool_id,
                observed_at: point.observed_at,
                price: point.price,
                confidence_score: confidence_for(point.data_source, point.source_count),
                volatility_index: volatility_index(&trailing),
            });
        }

        self.repository.upsert_canonical(canonical).await?;
        Ok(())
    }
}

/// Round a timestamp down to its bucket.
pub fn bucket_floor(at: DateTime<Utc>, bucket: Duration) -> DateTime<Utc> {
    at.duration_trunc(bucket).unwrap_or(at)
}

/// Median of a non-empty sample; even-sized samples average the middle pair.
pub fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

/// Deduplicate one pool's snapshots into per-bucket representative points.
/// Returns the points plus the snapshot ids that lost the dedup.
fn deduplicate(
    pool_id: Uuid,
    snapshots: Vec<SpotPriceSnapshot>,
) -> (Vec<NewConsolidatedPrice>, Vec<i64>) {
    let mut buckets: BTreeMap<DateTime<Utc>, Vec<SpotPriceSnapshot>> = BTreeMap::new();
    for snapshot in snapshots {
        let bucket = bucket_floor(snapshot.observed_at, Duration::minutes(BUCKET_MINUTES));
        buckets.entry(bucket).or_default().push(snapshot);
    }

    let mut points = Vec::with_capacity(buckets.len());
    let mut duplicate_ids = Vec::new();

    for (bucket, members) in buckets {
        let representative = median(members.iter().map(|s| s.price).collect());

        // The snapshot closest to the median survives; the rest are flagged
        let keeper = members
            .iter()
            .min_by(|a, b| {
                (a.price - representative)
                    .abs()
                    .total_cmp(&(b.price - representative).abs())
            })
            .map(|s| s.id);
        duplicate_ids.extend(members.iter().filter(|s| Some(s.id) != keeper).map(|s| s.id));

        points.push(NewConsolidatedPrice {
            pool_id,
            observed_at: bucket,
            price: representative,
            is_interpolated: false,
            source_count: members.len() as i32,
            data_source: PriceSource::Agent,
        });
    }

    (points, duplicate_ids)
}

/// Plan interpolated points for interior gaps wider than `step` but no wider
/// than `max_span`. Points are synthesized on the `step` grid strictly
/// between the gap's neighbors, linearly interpolated.
fn plan_gap_fill(
    points: &[NewConsolidatedPrice],
    step: Duration,
    max_span: Duration,
) -> Vec<NewConsolidatedPrice> {
    let mut fills = Vec::new();

    for pair in points.windows(2) {
        let (left, right) = (&pair[0], &pair[1]);
        let span = right.observed_at - left.observed_at;
        if span <= step || span > max_span {
            continue;
        }

        let mut at = left.observed_at + step;
        while at < right.observed_at {
            let fraction = (at - left.observed_at).num_seconds() as f64
                / span.num_seconds() as f64;
            let price = left.price + (right.price - left.price) * fraction;

            fills.push(NewConsolidatedPrice {
                pool_id: left.pool_id,
                observed_at: at,
                price,
                is_interpolated: true,
                source_count: 0,
                data_source: PriceSource::Interpolated,
            });

            at += step;
        }
    }

    fills
}

/// Ranges inside [from, to) not covered within `max_gap` of an existing point.
fn find_holes(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    covered: &[DateTime<Utc>],
    max_gap: Duration,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut holes = Vec::new();
    let mut cursor = from;

    for &at in covered {
        if at - cursor > max_gap {
            holes.push((cursor, at));
        }
        cursor = at;
    }

    if to - cursor > max_gap {
        holes.push((cursor, to));
    }

    holes
}

/// Confidence of a canonical point by provenance.
fn confidence_for(source: PriceSource, source_count: i32) -> f64 {
    match source {
        // Corroborated observations are more trustworthy than single reports
        PriceSource::Agent => {
            if source_count > 1 {
                1.0
            } else {
                0.9
            }
        }
        PriceSource::Backfill => 0.8,
        PriceSource::Interpolated => 0.7,
    }
}

/// Coefficient of variation over a trailing price window.
fn volatility_index(prices: &[f64]) -> f64 {
    if prices.len() < 2 {
        return 0.0;
    }

    let mean = prices.iter().sum::<f64>() / prices.len() as f64;
    if mean == 0.0 {
        return 0.0;
    }

    let variance =
        prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / prices.len() as f64;
    variance.sqrt() / mean
}
