use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use uuid::Uuid;

use crate::entity::{
    consolidation_runs, pools, pricing_canonical, pricing_consolidated, spot_price_snapshots,
};
use crate::error::{PricingError, PricingResult};
use crate::models::{
    CanonicalPrice, ConsolidatedPrice, ConsolidationRun, NewCanonicalPrice, NewConsolidatedPrice,
    NewSnapshot, Pool, PoolKey, RunCounters, RunStatus, SpotPriceSnapshot,
};
use crate::repository::PricingRepository;

/// PostgreSQL implementation of PricingRepository
#[derive(Clone)]
pub struct PgPricingRepository {
    db: DatabaseConnection,
}

impl PgPricingRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_pool(&self, key: &PoolKey) -> PricingResult<Option<pools::Model>> {
        let found = pools::Entity::find()
            .filter(pools::Column::InstanceType.eq(key.instance_type.clone()))
            .filter(pools::Column::Region.eq(key.region.clone()))
            .filter(pools::Column::Az.eq(key.az.clone()))
            .one(&self.db)
            .await?;
        Ok(found)
    }
}

#[async_trait]
impl PricingRepository for PgPricingRepository {
    async fn upsert_pool(&self, key: PoolKey) -> PricingResult<Pool> {
        if let Some(existing) = self.find_pool(&key).await? {
            return Ok(existing.into());
        }

        let now = Utc::now();
        let model = pools::ActiveModel {
            id: Set(Uuid::now_v7()),
            instance_type: Set(key.instance_type.clone()),
            region: Set(key.region.clone()),
            az: Set(key.az.clone()),
            mean_boot_seconds: Set(None),
            boot_samples: Set(0),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        match model.insert(&self.db).await {
            Ok(created) => Ok(created.into()),
            // Two agents may race on first sight of a pool; the loser re-reads
            Err(_) => self
                .find_pool(&key)
                .await?
                .map(Into::into)
                .ok_or_else(|| PricingError::Internal("pool upsert race lost twice".to_string())),
        }
    }

    async fn pool_by_id(&self, id: Uuid) -> PricingResult<Option<Pool>> {
        let result = pools::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Into::into);
        Ok(result)
    }

    async fn pool_by_key(&self, key: PoolKey) -> PricingResult<Option<Pool>> {
        Ok(self.find_pool(&key).await?.map(Into::into))
    }

    async fn list_pools(&self, region: Option<String>) -> PricingResult<Vec<Pool>> {
        let mut query = pools::Entity::find();

        if let Some(region) = region {
            query = query.filter(pools::Column::Region.eq(region));
        }

        let rows = query
            .order_by_asc(pools::Column::Region)
            .order_by_asc(pools::Column::Az)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn record_boot_sample(&self, pool_id: Uuid, boot_seconds: f64) -> PricingResult<Pool> {
        let pool = pools::Entity::find_by_id(pool_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| PricingError::NotFound(format!("pool {}", pool_id)))?;

        let samples = pool.boot_samples;
        let new_mean = match pool.mean_boot_seconds {
            Some(mean) => (mean * samples as f64 + boot_seconds) / (samples + 1) as f64,
            None => boot_seconds,
        };

        let mut model: pools::ActiveModel = pool.into();
        model.mean_boot_seconds = Set(Some(new_mean));
        model.boot_samples = Set(samples + 1);
        model.updated_at = Set(Utc::now().into());

        let updated = model.update(&self.db).await?;
        Ok(updated.into())
    }

    async fn insert_snapshots(&self, snapshots: Vec<NewSnapshot>) -> PricingResult<usize> {
        if snapshots.is_empty() {
            return Ok(0);
        }

        let count = snapshots.len();
        let now = Utc::now();
        let models: Vec<spot_price_snapshots::ActiveModel> = snapshots
            .into_iter()
            .map(|s| spot_price_snapshots::ActiveModel {
                id: NotSet,
                pool_id: Set(s.pool_id),
                price: Set(s.price),
                observed_at: Set(s.observed_at.into()),
                source_instance_id: Set(s.source_instance_id),
                source_role: Set(s.source_role.map(|r| r.to_string())),
                is_duplicate: Set(false),
                created_at: Set(now.into()),
            })
            .collect();

        spot_price_snapshots::Entity::insert_many(models)
            .exec(&self.db)
            .await?;

        Ok(count)
    }

    async fn snapshots_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PricingResult<Vec<SpotPriceSnapshot>> {
        let rows = spot_price_snapshots::Entity::find()
            .filter(
                spot_price_snapshots::Column::ObservedAt
                    .gte::<sea_orm::prelude::DateTimeWithTimeZone>(from.into()),
            )
            .filter(
                spot_price_snapshots::Column::ObservedAt
                    .lt::<sea_orm::prelude::DateTimeWithTimeZone>(to.into()),
            )
            .filter(spot_price_snapshots::Column::IsDuplicate.eq(false))
            .order_by_asc(spot_price_snapshots::Column::ObservedAt)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_snapshots_duplicate(&self, ids: Vec<i64>) -> PricingResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = spot_price_snapshots::Entity::update_many()
            .col_expr(spot_price_snapshots::Column::IsDuplicate, Expr::value(true))
            .filter(spot_price_snapshots::Column::Id.is_in(ids))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    async fn upsert_consolidated(&self, points: Vec<NewConsolidatedPrice>) -> PricingResult<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let count = points.len();
        let now = Utc::now();
        let models: Vec<pricing_consolidated::ActiveModel> = points
            .into_iter()
            .map(|p| pricing_consolidated::ActiveModel {
                id: Set(Uuid::now_v7()),
                pool_id: Set(p.pool_id),
                observed_at: Set(p.observed_at.into()),
                price: Set(p.price),
                is_interpolated: Set(p.is_interpolated),
                source_count: Set(p.source_count),
                data_source: Set(p.data_source),
                created_at: Set(now.into()),
            })
            .collect();

        pricing_consolidated::Entity::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    pricing_consolidated::Column::PoolId,
                    pricing_consolidated::Column::ObservedAt,
                ])
                .update_columns([
                    pricing_consolidated::Column::Price,
                    pricing_consolidated::Column::IsInterpolated,
                    pricing_consolidated::Column::SourceCount,
                    pricing_consolidated::Column::DataSource,
                ])
                .to_owned(),
            )
            .exec(&self.db)
            .await?;

        Ok(count)
    }

    async fn consolidated_for_pool(
        &self,
        pool_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PricingResult<Vec<ConsolidatedPrice>> {
        let rows = pricing_consolidated::Entity::find()
            .filter(pricing_consolidated::Column::PoolId.eq(pool_id))
            .filter(
                pricing_consolidated::Column::ObservedAt
                    .gte::<sea_orm::prelude::DateTimeWithTimeZone>(from.into()),
            )
            .filter(
                pricing_consolidated::Column::ObservedAt
                    .lt::<sea_orm::prelude::DateTimeWithTimeZone>(to.into()),
            )
            .order_by_asc(pricing_consolidated::Column::ObservedAt)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn latest_prices_for_region(
        &self,
        instance_type: String,
        region: String,
        since: DateTime<Utc>,
    ) -> PricingResult<Vec<(Pool, ConsolidatedPrice)>> {
        let candidate_pools = pools::Entity::find()
            .filter(pools::Column::InstanceType.eq(instance_type))
            .filter(pools::Column::Region.eq(region))
            .all(&self.db)
            .await?;

        let mut results = Vec::with_capacity(candidate_pools.len());
        for pool in candidate_pools {
            let latest = pricing_consolidated::Entity::find()
                .filter(pricing_consolidated::Column::PoolId.eq(pool.id))
                .filter(
                    pricing_consolidated::Column::ObservedAt
                        .gte::<sea_orm::prelude::DateTimeWithTimeZone>(since.into()),
                )
                .order_by_desc(pricing_consolidated::Column::ObservedAt)
                .one(&self.db)
                .await?;

            if let Some(price) = latest {
                results.push((pool.into(), price.into()));
            }
        }

        Ok(results)
    }

    async fn upsert_canonical(&self, points: Vec<NewCanonicalPrice>) -> PricingResult<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let count = points.len();
        let now = Utc::now();
        let models: Vec<pricing_canonical::ActiveModel> = points
            .into_iter()
            .map(|p| pricing_canonical::ActiveModel {
                id: Set(Uuid::now_v7()),
                pool_id: Set(p.pool_id),
                observed_at: Set(p.observed_at.into()),
                price: Set(p.price),
                confidence_score: Set(p.confidence_score),
                volatility_index: Set(p.volatility_index),
                created_at: Set(now.into()),
            })
            .collect();

        pricing_canonical::Entity::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    pricing_canonical::Column::PoolId,
                    pricing_canonical::Column::ObservedAt,
                ])
                .update_columns([
                    pricing_canonical::Column::Price,
                    pricing_canonical::Column::ConfidenceScore,
                    pricing_canonical::Column::VolatilityIndex,
                ])
                .to_owned(),
            )
            .exec(&self.db)
            .await?;

        Ok(count)
    }

    async fn canonical_history(
        &self,
        pool_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PricingResult<Vec<CanonicalPrice>> {
        let rows = pricing_canonical::Entity::find()
            .filter(pricing_canonical::Column::PoolId.eq(pool_id))
            .filter(
                pricing_canonical::Column::ObservedAt
                    .gte::<sea_orm::prelude::DateTimeWithTimeZone>(from.into()),
            )
            .filter(
                pricing_canonical::Column::ObservedAt
                    .lt::<sea_orm::prelude::DateTimeWithTimeZone>(to.into()),
            )
            .order_by_asc(pricing_canonical::Column::ObservedAt)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_run(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> PricingResult<ConsolidationRun> {
        let model = consolidation_runs::ActiveModel {
            id: Set(Uuid::now_v7()),
            status: Set(RunStatus::Running),
            window_start: Set(window_start.into()),
            window_end: Set(window_end.into()),
            snapshots_processed: Set(0),
            duplicates_removed: Set(0),
            gaps_filled: Set(0),
            backfills_added: Set(0),
            error: Set(None),
            started_at: Set(Utc::now().into()),
            finished_at: Set(None),
        };

        let created = model.insert(&self.db).await?;
        Ok(created.into())
    }

    async fn complete_run(&self, run_id: Uuid, counters: RunCounters) -> PricingResult<()> {
        consolidation_runs::Entity::update_many()
            .col_expr(
                consolidation_runs::Column::Status,
                Expr::value(RunStatus::Completed),
            )
            .col_expr(
                consolidation_runs::Column::SnapshotsProcessed,
                Expr::value(counters.snapshots_processed),
            )
            .col_expr(
                consolidation_runs::Column::DuplicatesRemoved,
                Expr::value(counters.duplicates_removed),
            )
            .col_expr(
                consolidation_runs::Column::GapsFilled,
                Expr::value(counters.gaps_filled),
            )
            .col_expr(
                consolidation_runs::Column::BackfillsAdded,
                Expr::value(counters.backfills_added),
            )
            .col_expr(
                consolidation_runs::Column::FinishedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(consolidation_runs::Column::Id.eq(run_id))
            .exec(&self.db)
            .await?;

        Ok(())
    }

    async fn fail_run(&self, run_id: Uuid, error: String) -> PricingResult<()> {
        consolidation_runs::Entity::update_many()
            .col_expr(
                consolidation_runs::Column::Status,
                Expr::value(RunStatus::Failed),
            )
            .col_expr(consolidation_runs::Column::Error, Expr::value(error))
            .col_expr(
                consolidation_runs::Column::FinishedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(consolidation_runs::Column::Id.eq(run_id))
            .exec(&self.db)
            .await?;

        Ok(())
    }

    async fn last_completed_run(&self) -> PricingResult<Option<ConsolidationRun>> {
        let run = consolidation_runs::Entity::find()
            .filter(consolidation_runs::Column::Status.eq(RunStatus::Completed))
            .order_by_desc(consolidation_runs::Column::WindowEnd)
            .one(&self.db)
            .await?;

        Ok(run.map(Into::into))
    }

    async fn list_runs(&self, limit: u64) -> PricingResult<Vec<ConsolidationRun>> {
        let rows = consolidation_runs::Entity::find()
            .order_by_desc(consolidation_runs::Column::StartedAt)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
