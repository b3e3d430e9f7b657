use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create agent_mode enum
        manager
            .create_type(
                Type::create()
                    .as_enum(AgentModeEnum::Enum)
                    .values([
                        AgentModeEnum::Unknown,
                        AgentModeEnum::Ondemand,
                        AgentModeEnum::Spot,
                    ])
                    .to_owned(),
            )
            .await?;

        // Create agent_status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(AgentStatusEnum::Enum)
                    .values([
                        AgentStatusEnum::Offline,
                        AgentStatusEnum::Online,
                        AgentStatusEnum::Error,
                    ])
                    .to_owned(),
            )
            .await?;

        // Create notice_status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(NoticeStatusEnum::Enum)
                    .values([
                        NoticeStatusEnum::None,
                        NoticeStatusEnum::Rebalance,
                        NoticeStatusEnum::Termination,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Agents::Table)
                    .if_not_exists()
                    .col(pk_uuid(Agents::Id))
                    .col(uuid(Agents::ClientId).not_null())
                    .col(string_len(Agents::LogicalId, 255).not_null())
                    .col(string_len_null(Agents::CurrentInstanceId, 255))
                    .col(string_len(Agents::Region, 100).not_null())
                    .col(string_len(Agents::Az, 100).not_null())
                    .col(string_len_null(Agents::InstanceType, 255))
                    .col(
                        ColumnDef::new(Agents::Mode)
                            .enumeration(
                                AgentModeEnum::Enum,
                                [
                                    AgentModeEnum::Unknown,
                                    AgentModeEnum::Ondemand,
                                    AgentModeEnum::Spot,
                                ],
                            )
                            .not_null()
                            .default("unknown"),
                    )
                    .col(uuid_null(Agents::CurrentPoolId))
                    .col(boolean(Agents::AutoSwitchEnabled).not_null().default(true))
                    .col(
                        boolean(Agents::ManualReplicaEnabled)
                            .not_null()
                            .default(false),
                    )
                    .col(boolean(Agents::AutoTerminate).not_null().default(true))
                    .col(integer_null(Agents::TerminateWaitSeconds))
                    .col(timestamp_with_time_zone_null(Agents::LastHeartbeat))
                    .col(
                        ColumnDef::new(Agents::Status)
                            .enumeration(
                                AgentStatusEnum::Enum,
                                [
                                    AgentStatusEnum::Offline,
                                    AgentStatusEnum::Online,
                                    AgentStatusEnum::Error,
                                ],
                            )
                            .not_null()
                            .default("offline"),
                    )
                    .col(
                        ColumnDef::new(Agents::NoticeStatus)
                            .enumeration(
                                NoticeStatusEnum::Enum,
                                [
                                    NoticeStatusEnum::None,
                                    NoticeStatusEnum::Rebalance,
                                    NoticeStatusEnum::Termination,
                                ],
                            )
                            .not_null()
                            .default("none"),
                    )
                    .col(timestamp_with_time_zone_null(Agents::NoticeDeadline))
                    .col(integer(Agents::FailedPromotions).not_null().default(0))
                    .col(uuid_null(Agents::FastestPoolId))
                    .col(string_len_null(Agents::AgentVersion, 64))
                    .col(string_len_null(Agents::Hostname, 255))
                    .col(string_len_null(Agents::PrivateIp, 64))
                    .col(string_len_null(Agents::PublicIp, 64))
                    .col(big_integer(Agents::Version).not_null().default(1))
                    .col(
                        timestamp_with_time_zone(Agents::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Agents::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_agents_client")
                            .from(Agents::Table, Agents::ClientId)
                            .to(Clients::Table, Clients::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Logical identity is stable across instance replacement
        manager
            .create_index(
                Index::create()
                    .name("idx_agents_client_logical_id")
                    .table(Agents::Table)
                    .col(Agents::ClientId)
                    .col(Agents::LogicalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_agents_status")
                    .table(Agents::Table)
                    .col(Agents::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_agents_last_heartbeat")
                    .table(Agents::Table)
                    .col(Agents::LastHeartbeat)
                    .to_owned(),
            )
            .await?;

        // Policy toggles are never both true, regardless of the write path
        manager
            .get_connection()
            .execute_unprepared(
                "ALTER TABLE agents ADD CONSTRAINT agents_policy_exclusive \
                 CHECK (NOT (auto_switch_enabled AND manual_replica_enabled))",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER agents_touch_updated_at
                    BEFORE UPDATE ON agents
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
            .execute_unprepared("DROP TRIGGER IF EXISTS agents_touch_updated_at ON agents")
            .await?;

        manager
            .drop_table(Table::drop().table(Agents::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(NoticeStatusEnum::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(AgentStatusEnum::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(AgentModeEnum::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Agents {
    Table,
    Id,
    ClientId,
    LogicalId,
    CurrentInstanceId,
    Region,
    Az,
    InstanceType,
    Mode,
    CurrentPoolId,
    AutoSwitchEnabled,
    ManualReplicaEnabled,
    AutoTerminate,
    TerminateWaitSeconds,
    LastHeartbeat,
    Status,
    NoticeStatus,
    NoticeDeadline,
    FailedPromotions,
    FastestPoolId,
    AgentVersion,
    Hostname,
    PrivateIp,
    PublicIp,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Clients {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum AgentModeEnum {
    #[sea_orm(iden = "agent_mode")]
    Enum,
    #[sea_orm(iden = "unknown")]
    Unknown,
    #[sea_orm(iden = "ondemand")]
    Ondemand,
    #[sea_orm(iden = "spot")]
    Spot,
}

#[derive(DeriveIden)]
enum AgentStatusEnum {
    #[sea_orm(iden = "agent_status")]
    Enum,
    #[sea_orm(iden = "offline")]
    Offline,
    #[sea_orm(iden = "online")]
    Online,
    #[sea_orm(iden = "error")]
    Error,
}

#[derive(DeriveIden)]
enum NoticeStatusEnum {
    #[sea_orm(iden = "none")]
    None,
    #[sea_orm(iden = "notice_status")]
    Enum,
    #[sea_orm(iden = "rebalance")]
    Rebalance,
    #[sea_orm(iden = "termination")]
    Termination,
}
