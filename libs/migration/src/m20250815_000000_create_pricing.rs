use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create price_source enum
        manager
            .create_type(
                Type::create()
                    .as_enum(PriceSourceEnum::Enum)
                    .values([
                        PriceSourceEnum::Agent,
                        PriceSourceEnum::Interpolated,
                        PriceSourceEnum::Backfill,
                    ])
                    .to_owned(),
            )
            .await?;

        // Create run_status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(RunStatusEnum::Enum)
                    .values([
                        RunStatusEnum::Running,
                        RunStatusEnum::Completed,
                        RunStatusEnum::Failed,
                    ])
                    .to_owned(),
            )
            .await?;

        // Staging tier: raw agent-reported prices. Range-partitioned on
        // created_at so old windows drop in O(1); sea-query has no partition
        // DDL, so this table is created raw. The scheduler's maintenance task
        // creates monthly partitions ahead of time; the DEFAULT partition
        // catches anything outside them.
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE spot_price_snapshots (
                    id BIGINT GENERATED BY DEFAULT AS IDENTITY,
                    pool_id UUID NOT NULL,
                    price DOUBLE PRECISION NOT NULL,
                    observed_at TIMESTAMPTZ NOT NULL,
                    source_instance_id VARCHAR(255),
                    source_role VARCHAR(16),
                    is_duplicate BOOLEAN NOT NULL DEFAULT FALSE,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    PRIMARY KEY (id, created_at)
                ) PARTITION BY RANGE (created_at)
                "#,
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE TABLE spot_price_snapshots_default \
                 PARTITION OF spot_price_snapshots DEFAULT",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX idx_spot_price_snapshots_pool_observed \
                 ON spot_price_snapshots (pool_id, observed_at)",
            )
            .await?;

        // Consolidated tier: one representative price per (pool, bucket)
        manager
            .create_table(
                Table::create()
                    .table(PricingConsolidated::Table)
                    .if_not_exists()
                    .col(pk_uuid(PricingConsolidated::Id))
                    .col(uuid(PricingConsolidated::PoolId).not_null())
                    .col(timestamp_with_time_zone(PricingConsolidated::ObservedAt).not_null())
                    .col(double(PricingConsolidated::Price).not_null())
                    .col(
                        boolean(PricingConsolidated::IsInterpolated)
                            .not_null()
                            .default(false),
                    )
                    .col(
                        integer(PricingConsolidated::SourceCount)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PricingConsolidated::DataSource)
                            .enumeration(
                                PriceSourceEnum::Enum,
                                [
                                    PriceSourceEnum::Agent,
                                    PriceSourceEnum::Interpolated,
                                    PriceSourceEnum::Backfill,
                                ],
                            )
                            .not_null()
                            .default("agent"),
                    )
                    .col(
                        timestamp_with_time_zone(PricingConsolidated::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pricing_consolidated_pool")
                            .from(PricingConsolidated::Table, PricingConsolidated::PoolId)
                            .to(Pools::Table, Pools::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // The deduplication invariant lives in the schema
        manager
            .create_index(
                Index::create()
                    .name("idx_pricing_consolidated_pool_observed")
                    .table(PricingConsolidated::Table)
                    .col(PricingConsolidated::PoolId)
                    .col(PricingConsolidated::ObservedAt)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Canonical tier: read surface for the ML model and charts
        manager
            .create_table(
                Table::create()
                    .table(PricingCanonical::Table)
                    .if_not_exists()
                    .col(pk_uuid(PricingCanonical::Id))
                    .col(uuid(PricingCanonical::PoolId).not_null())
                    .col(timestamp_with_time_zone(PricingCanonical::ObservedAt).not_null())
                    .col(double(PricingCanonical::Price).not_null())
                    .col(
                        double(PricingCanonical::ConfidenceScore)
                            .not_null()
                            .default(1.0),
                    )
                    .col(
                        double(PricingCanonical::VolatilityIndex)
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        timestamp_with_time_zone(PricingCanonical::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pricing_canonical_pool")
                            .from(PricingCanonical::Table, PricingCanonical::PoolId)
                            .to(Pools::Table, Pools::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pricing_canonical_pool_observed")
                    .table(PricingCanonical::Table)
                    .col(PricingCanonical::PoolId)
                    .col(PricingCanonical::ObservedAt)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Consolidation job tracking
        manager
            .create_table(
                Table::create()
                    .table(ConsolidationRuns::Table)
                    .if_not_exists()
                    .col(pk_uuid(ConsolidationRuns::Id))
                    .col(
                        ColumnDef::new(ConsolidationRuns::Status)
                            .enumeration(
                                RunStatusEnum::Enum,
                                [
                                    RunStatusEnum::Running,
                                    RunStatusEnum::Completed,
                                    RunStatusEnum::Failed,
                                ],
                            )
                            .not_null()
                            .default("running"),
                    )
                    .col(timestamp_with_time_zone(ConsolidationRuns::WindowStart).not_null())
                    .col(timestamp_with_time_zone(ConsolidationRuns::WindowEnd).not_null())
                    .col(
                        integer(ConsolidationRuns::SnapshotsProcessed)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        integer(ConsolidationRuns::DuplicatesRemoved)
                            .not_null()
                            .default(0),
                    )
                    .col(integer(ConsolidationRuns::GapsFilled).not_null().default(0))
                    .col(
                        integer(ConsolidationRuns::BackfillsAdded)
                            .not_null()
                            .default(0),
                    )
                    .col(text_null(ConsolidationRuns::Error))
                    .col(
                        timestamp_with_time_zone(ConsolidationRuns::StartedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(ConsolidationRuns::FinishedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_consolidation_runs_started")
                    .table(ConsolidationRuns::Table)
                    .col(ConsolidationRuns::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ConsolidationRuns::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(PricingCanonical::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(PricingConsolidated::Table).to_owned())
            .await?;

        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS spot_price_snapshots")
            .await?;

        manager
            .drop_type(Type::drop().name(RunStatusEnum::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(PriceSourceEnum::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum PricingConsolidated {
    Table,
    Id,
    PoolId,
    ObservedAt,
    Price,
    IsInterpolated,
    SourceCount,
    DataSource,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PricingCanonical {
    Table,
    Id,
    PoolId,
    ObservedAt,
    Price,
    ConfidenceScore,
    VolatilityIndex,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ConsolidationRuns {
    Table,
    Id,
    Status,
    WindowStart,
    WindowEnd,
    SnapshotsProcessed,
    DuplicatesRemoved,
    GapsFilled,
    BackfillsAdded,
    Error,
    StartedAt,
    FinishedAt,
}

#[derive(DeriveIden)]
enum Pools {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum PriceSourceEnum {
    #[sea_orm(iden = "price_source")]
    Enum,
    #[sea_orm(iden = "agent")]
    Agent,
    #[sea_orm(iden = "interpolated")]
    Interpolated,
    #[sea_orm(iden = "backfill")]
    Backfill,
}

#[derive(DeriveIden)]
enum RunStatusEnum {
    #[sea_orm(iden = "run_status")]
    Enum,
    #[sea_orm(iden = "running")]
    Running,
    #[sea_orm(iden = "completed")]
    Completed,
    #[sea_orm(iden = "failed")]
    Failed,
}
