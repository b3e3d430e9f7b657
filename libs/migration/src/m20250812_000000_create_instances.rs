use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create instance_role enum
        manager
            .create_type(
                Type::create()
                    .as_enum(InstanceRoleEnum::Enum)
                    .values([
                        InstanceRoleEnum::Launching,
                        InstanceRoleEnum::RunningPrimary,
                        InstanceRoleEnum::RunningReplica,
                        InstanceRoleEnum::Promoting,
                        InstanceRoleEnum::Terminating,
                        InstanceRoleEnum::Terminated,
                        InstanceRoleEnum::Zombie,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Instances::Table)
                    .if_not_exists()
                    // Cloud-assigned id, or a temporary id before launch confirmation
                    .col(string_len(Instances::Id, 255).not_null().primary_key())
                    .col(uuid(Instances::AgentId).not_null())
                    .col(
                        ColumnDef::new(Instances::Role)
                            .enumeration(
                                InstanceRoleEnum::Enum,
                                [
                                    InstanceRoleEnum::Launching,
                                    InstanceRoleEnum::RunningPrimary,
                                    InstanceRoleEnum::RunningReplica,
                                    InstanceRoleEnum::Promoting,
                                    InstanceRoleEnum::Terminating,
                                    InstanceRoleEnum::Terminated,
                                    InstanceRoleEnum::Zombie,
                                ],
                            )
                            .not_null()
                            .default("launching"),
                    )
                    .col(string_len(Instances::InstanceType, 255).not_null())
                    .col(string_len(Instances::Region, 100).not_null())
                    .col(string_len(Instances::Az, 100).not_null())
                    .col(uuid_null(Instances::PoolId))
                    .col(double_null(Instances::SpotPrice))
                    .col(double_null(Instances::OndemandPrice))
                    .col(double_null(Instances::BaselineOndemandPrice))
                    .col(timestamp_with_time_zone_null(Instances::LaunchRequestedAt))
                    .col(timestamp_with_time_zone_null(Instances::LaunchConfirmedAt))
                    .col(timestamp_with_time_zone_null(Instances::LastSwitchAt))
                    .col(timestamp_with_time_zone_null(
                        Instances::TerminateRequestedAt,
                    ))
                    .col(timestamp_with_time_zone_null(Instances::TerminatedAt))
                    .col(big_integer(Instances::Version).not_null().default(1))
                    .col(
                        timestamp_with_time_zone(Instances::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Instances::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_instances_agent")
                            .from(Instances::Table, Instances::AgentId)
                            .to(Agents::Table, Agents::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_instances_agent_role")
                    .table(Instances::Table)
                    .col(Instances::AgentId)
                    .col(Instances::Role)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_instances_terminated_at")
                    .table(Instances::Table)
                    .col(Instances::TerminatedAt)
                    .to_owned(),
            )
            .await?;

        // At most one primary (or promoting) instance per agent, enforced by
        // the database itself: a racing promotion loses with a unique violation
        // even if the application check is bypassed.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX idx_instances_one_primary_per_agent \
                 ON instances (agent_id) \
                 WHERE role IN ('running_primary', 'promoting')",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER instances_touch_updated_at
                    BEFORE UPDATE ON instances
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
            .execute_unprepared("DROP TRIGGER IF EXISTS instances_touch_updated_at ON instances")
            .await?;

        manager
            .drop_table(Table::drop().table(Instances::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(InstanceRoleEnum::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Instances {
    Table,
    Id,
    AgentId,
    Role,
    InstanceType,
    Region,
    Az,
    PoolId,
    SpotPrice,
    OndemandPrice,
    BaselineOndemandPrice,
    LaunchRequestedAt,
    LaunchConfirmedAt,
    LastSwitchAt,
    TerminateRequestedAt,
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
enum InstanceRoleEnum {
    #[sea_orm(iden = "instance_role")]
    Enum,
    #[sea_orm(iden = "launching")]
    Launching,
    #[sea_orm(iden = "running_primary")]
    RunningPrimary,
    #[sea_orm(iden = "running_replica")]
    RunningReplica,
    #[sea_orm(iden = "promoting")]
    Promoting,
    #[sea_orm(iden = "terminating")]
    Terminating,
    #[sea_orm(iden = "terminated")]
    Terminated,
    #[sea_orm(iden = "zombie")]
    Zombie,
}
