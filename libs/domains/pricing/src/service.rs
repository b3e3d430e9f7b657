use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{PricingError, PricingResult};
use crate::models::{
    CanonicalPrice, ConsolidatedPrice, ConsolidationRun, NewSnapshot, Pool, PoolKey, PricingReport,
    SourceRole,
};
use crate::repository::PricingRepository;

/// Only consolidated points younger than this count as "fresh" when picking
/// the cheapest pool.
const FRESH_PRICE_MINUTES: i64 = 60;

/// Service for pools and the pricing pipeline's read/write surface
pub struct PricingService<R: PricingRepository> {
    repository: Arc<R>,
}

impl<R: PricingRepository> Clone for PricingService<R> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<R: PricingRepository> PricingService<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository: Arc::new(repository),
        }
    }

    /// Find or create the pool for a key.
    pub async fn resolve_pool(&self, key: PoolKey) -> PricingResult<Pool> {
        self.repository.upsert_pool(key).await
    }

    pub async fn pool(&self, id: Uuid) -> PricingResult<Pool> {
        self.repository
            .pool_by_id(id)
            .await?
            .ok_or_else(|| PricingError::NotFound(format!("pool {}", id)))
    }

    pub async fn list_pools(&self, region: Option<String>) -> PricingResult<Vec<Pool>> {
        self.repository.list_pools(region).await
    }

    /// Stage an agent's price report. Over-reporting is accepted as-is;
    /// deduplication belongs to the consolidator.
    pub async fn ingest_report(
        &self,
        instance_type: &str,
        region: &str,
        source_instance_id: Option<String>,
        source_role: Option<SourceRole>,
        report: PricingReport,
    ) -> PricingResult<usize> {
        let observed_at = report.observed_at.unwrap_or_else(Utc::now);

        let mut snapshots = Vec::with_capacity(report.pools.len());
        for item in &report.pools {
            let pool = self
                .repository
                .upsert_pool(PoolKey::new(instance_type, region, item.id.clone()))
                .await?;

            snapshots.push(NewSnapshot {
                pool_id: pool.id,
                price: item.price,
                observed_at,
                source_instance_id: source_instance_id.clone(),
                source_role,
            });
        }

        self.repository.insert_snapshots(snapshots).await
    }

    /// Latest fresh consolidated price per pool for an (instance type, region).
    pub async fn latest_prices(
        &self,
        instance_type: &str,
        region: &str,
    ) -> PricingResult<Vec<(Pool, ConsolidatedPrice)>> {
        let since = Utc::now() - Duration::minutes(FRESH_PRICE_MINUTES);
        self.repository
            .latest_prices_for_region(instance_type.to_string(), region.to_string(), since)
            .await
    }

    /// The cheapest pool with a fresh price, optionally excluding one pool.
    pub async fn cheapest_pool(
        &self,
        instance_type: &str,
        region: &str,
        exclude_pool: Option<Uuid>,
    ) -> PricingResult<Option<(Pool, ConsolidatedPrice)>> {
        let prices = self.latest_prices(instance_type, region).await?;

        Ok(prices
            .into_iter()
            .filter(|(pool, _)| Some(pool.id) != exclude_pool)
            .min_by(|(_, a), (_, b)| a.price.total_cmp(&b.price)))
    }

    /// Canonical series for charts and the ML model.
    pub async fn canonical_history(
        &self,
        pool_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> PricingResult<Vec<CanonicalPrice>> {
        // Pool must exist; an unknown id is a 404, not an empty series
        self.pool(pool_id).await?;

        let to = to.unwrap_or_else(Utc::now);
        let from = from.unwrap_or(to - Duration::days(7));
        self.repository.canonical_history(pool_id, from, to).await
    }

    /// Fold a boot-time sample into the pool's rolling mean. Called after a
    /// successful replica promotion.
    pub async fn record_boot_sample(&self, pool_id: Uuid, boot_seconds: f64) -> PricingResult<Pool> {
        self.repository.record_boot_sample(pool_id, boot_seconds).await
    }

    /// Recent consolidation runs, newest first.
    pub async fn recent_runs(&self, limit: u64) -> PricingResult<Vec<ConsolidationRun>> {
        self.repository.list_runs(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PriceSource, PricingReportItem};
    use crate::repository::MockPricingRepository;

    fn pool(id: Uuid, az: &str) -> Pool {
        Pool {
            id,
            instance_type: "c5.large".to_string(),
            region: "us-east-1".to_string(),
            az: az.to_string(),
            mean_boot_seconds: None,
            boot_samples: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn price(pool_id: Uuid, value: f64) -> ConsolidatedPrice {
        ConsolidatedPrice {
            id: Uuid::now_v7(),
            pool_id,
            observed_at: Utc::now(),
            price: value,
            is_interpolated: false,
            source_count: 1,
            data_source: PriceSource::Agent,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_ingest_report_stages_one_snapshot_per_pool() {
        let mut repo = MockPricingRepository::new();

        repo.expect_upsert_pool()
            .times(2)
            .returning(|key| Ok(pool(Uuid::now_v7(), &key.az)));
        repo.expect_insert_snapshots()
            .withf(|snapshots| snapshots.len() == 2 && snapshots.iter().all(|s| !s.price.is_nan()))
            .returning(|snapshots| Ok(snapshots.len()));

        let service = PricingService::new(repo);
        let report = PricingReport {
            pools: vec![
                PricingReportItem {
                    id: "us-east-1a".to_string(),
                    price: 0.032,
                },
                PricingReportItem {
                    id: "us-east-1b".to_string(),
                    price: 0.035,
                },
            ],
            on_demand_price: Some(0.096),
            observed_at: None,
        };

        let staged = service
            .ingest_report(
                "c5.large",
                "us-east-1",
                Some("i-A".to_string()),
                Some(SourceRole::Primary),
                report,
            )
            .await
            .unwrap();
        assert_eq!(staged, 2);
    }

    #[tokio::test]
    async fn test_cheapest_pool_excludes_current() {
        let cheap = pool(Uuid::now_v7(), "us-east-1a");
        let expensive = pool(Uuid::now_v7(), "us-east-1b");
        let cheap_id = cheap.id;
        let expensive_id = expensive.id;

        let mut repo = MockPricingRepository::new();
        repo.expect_latest_prices_for_region().returning(move |_, _, _| {
            Ok(vec![
                (pool(cheap_id, "us-east-1a"), price(cheap_id, 0.030)),
                (pool(expensive_id, "us-east-1b"), price(expensive_id, 0.040)),
            ])
        });

        let service = PricingService::new(repo);

        let best = service
            .cheapest_pool("c5.large", "us-east-1", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(best.0.id, cheap_id);

        // Excluding the cheapest pool falls through to the next one
        let second = service
            .cheapest_pool("c5.large", "us-east-1", Some(cheap_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.0.id, expensive_id);
    }
}
