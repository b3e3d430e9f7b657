use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create replica_kind enum
        manager
            .create_type(
                Type::create()
                    .as_enum(ReplicaKindEnum::Enum)
                    .values([ReplicaKindEnum::Manual, ReplicaKindEnum::Emergency])
                    .to_owned(),
            )
            .await?;

        // Create replica_status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(ReplicaStatusEnum::Enum)
                    .values([
                        ReplicaStatusEnum::Launching,
                        ReplicaStatusEnum::Syncing,
                        ReplicaStatusEnum::Ready,
                        ReplicaStatusEnum::Promoted,
                        ReplicaStatusEnum::Terminated,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ReplicaInstances::Table)
                    .if_not_exists()
                    .col(pk_uuid(ReplicaInstances::Id))
                    .col(uuid(ReplicaInstances::AgentId).not_null())
                    .col(string_len_null(ReplicaInstances::ParentInstanceId, 255))
                    // Concrete cloud id, bound by the agent once launched
                    .col(string_len_null(ReplicaInstances::InstanceId, 255))
                    .col(uuid(ReplicaInstances::PoolId).not_null())
                    .col(
                        ColumnDef::new(ReplicaInstances::Kind)
                            .enumeration(
                                ReplicaKindEnum::Enum,
                                [ReplicaKindEnum::Manual, ReplicaKindEnum::Emergency],
                            )
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReplicaInstances::Status)
                            .enumeration(
                                ReplicaStatusEnum::Enum,
                                [
                                    ReplicaStatusEnum::Launching,
                                    ReplicaStatusEnum::Syncing,
                                    ReplicaStatusEnum::Ready,
                                    ReplicaStatusEnum::Promoted,
                                    ReplicaStatusEnum::Terminated,
                                ],
                            )
                            .not_null()
                            .default("launching"),
                    )
                    .col(double_null(ReplicaInstances::SyncLagSeconds))
                    .col(timestamp_with_time_zone(ReplicaInstances::RequestedAt).not_null())
                    .col(timestamp_with_time_zone_null(ReplicaInstances::LaunchedAt))
                    .col(timestamp_with_time_zone_null(ReplicaInstances::ReadyAt))
                    .col(timestamp_with_time_zone_null(ReplicaInstances::PromotedAt))
                    .col(timestamp_with_time_zone_null(ReplicaInstances::TerminatedAt))
                    .col(big_integer(ReplicaInstances::Version).not_null().default(1))
                    .col(
                        timestamp_with_time_zone(ReplicaInstances::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(ReplicaInstances::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_replica_instances_agent")
                            .from(ReplicaInstances::Table, ReplicaInstances::AgentId)
                            .to(Agents::Table, Agents::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_replica_instances_pool")
                            .from(ReplicaInstances::Table, ReplicaInstances::PoolId)
                            .to(Pools::Table, Pools::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_replica_instances_agent_status")
                    .table(ReplicaInstances::Table)
                    .col(ReplicaInstances::AgentId)
                    .col(ReplicaInstances::Status)
                    .to_owned(),
            )
            .await?;

        // Fastest-boot pool selection scans promoted replicas per pool
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX idx_replica_instances_promoted_pool \
                 ON replica_instances (pool_id, promoted_at) \
                 WHERE status = 'promoted'",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER replica_instances_touch_updated_at
                    BEFORE UPDATE ON replica_instances
                    FOR EACH ROW
                    EXECUTE FUNCTION util.touch_updated_at()
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                "DROP TRIGGER IF EXISTS replica_instances_touch_updated_at ON replica_instances",
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ReplicaInstances::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(ReplicaStatusEnum::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(ReplicaKindEnum::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum ReplicaInstances {
    Table,
    Id,
    AgentId,
    ParentInstanceId,
    InstanceId,
    PoolId,
    Kind,
    Status,
    SyncLagSeconds,
    RequestedAt,
    LaunchedAt,
    ReadyAt,
    PromotedAt,
    TerminatedAt,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Agents {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Pools {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum ReplicaKindEnum {
    #[sea_orm(iden = "replica_kind")]
    Enum,
    #[sea_orm(iden = "manual")]
    Manual,
    #[sea_orm(iden = "emergency")]
    Emergency,
}

#[derive(DeriveIden)]
enum ReplicaStatusEnum {
    #[sea_orm(iden = "replica_status")]
    Enum,
    #[sea_orm(iden = "launching")]
    Launching,
    #[sea_orm(iden = "syncing")]
    Syncing,
    #[sea_orm(iden = "ready")]
    Ready,
    #[sea_orm(iden = "promoted")]
    Promoted,
    #[sea_orm(iden = "terminated")]
    Terminated,
}
