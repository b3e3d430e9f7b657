use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create command_kind enum
        manager
            .create_type(
                Type::create()
                    .as_enum(CommandKindEnum::Enum)
                    .values([
                        CommandKindEnum::Switch,
                        CommandKindEnum::LaunchInstance,
                        CommandKindEnum::TerminateInstance,
                        CommandKindEnum::PromoteReplica,
                        CommandKindEnum::ApplyConfig,
                        CommandKindEnum::SelfDestruct,
                    ])
                    .to_owned(),
            )
            .await?;

        // Create command_status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(CommandStatusEnum::Enum)
                    .values([
                        CommandStatusEnum::Pending,
                        CommandStatusEnum::Executing,
                        CommandStatusEnum::Completed,
                        CommandStatusEnum::Failed,
                    ])
                    .to_owned(),
            )
            .await?;

        // Create command_trigger enum
        manager
            .create_type(
                Type::create()
                    .as_enum(CommandTriggerEnum::Enum)
                    .values([
                        CommandTriggerEnum::Manual,
                        CommandTriggerEnum::Ml,
                        CommandTriggerEnum::Emergency,
                        CommandTriggerEnum::Scheduled,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Commands::Table)
                    .if_not_exists()
                    .col(pk_uuid(Commands::Id))
                    .col(uuid(Commands::AgentId).not_null())
                    .col(string_len(Commands::RequestId, 255).not_null())
                    .col(
                        ColumnDef::new(Commands::Kind)
                            .enumeration(
                                CommandKindEnum::Enum,
                                [
                                    CommandKindEnum::Switch,
                                    CommandKindEnum::LaunchInstance,
                                    CommandKindEnum::TerminateInstance,
                                    CommandKindEnum::PromoteReplica,
                                    CommandKindEnum::ApplyConfig,
                                    CommandKindEnum::SelfDestruct,
                                ],
                            )
                            .not_null(),
                    )
                    .col(string_len_null(Commands::TargetMode, 32))
                    .col(uuid_null(Commands::TargetPoolId))
                    .col(small_integer(Commands::Priority).not_null().default(10))
                    .col(integer_null(Commands::TerminateWaitSeconds))
                    .col(
                        ColumnDef::new(Commands::Status)
                            .enumeration(
                                CommandStatusEnum::Enum,
                                [
                                    CommandStatusEnum::Pending,
                                    CommandStatusEnum::Executing,
                                    CommandStatusEnum::Completed,
                                    CommandStatusEnum::Failed,
                                ],
                            )
                            .not_null()
                            .default("pending"),
                    )
                    .col(json_binary(Commands::Payload).not_null().default("{}"))
                    .col(json_binary_null(Commands::PreState))
                    .col(json_binary_null(Commands::PostState))
                    .col(json_binary_null(Commands::Result))
                    .col(
                        ColumnDef::new(Commands::Trigger)
                            .enumeration(
                                CommandTriggerEnum::Enum,
                                [
                                    CommandTriggerEnum::Manual,
                                    CommandTriggerEnum::Ml,
                                    CommandTriggerEnum::Emergency,
                                    CommandTriggerEnum::Scheduled,
                                ],
                            )
                            .not_null()
                            .default("manual"),
                    )
                    .col(uuid_null(Commands::UserId))
                    .col(big_integer(Commands::Version).not_null().default(1))
                    .col(
                        timestamp_with_time_zone(Commands::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(Commands::ExecutedAt))
                    .col(timestamp_with_time_zone_null(Commands::CompletedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_commands_agent")
                            .from(Commands::Table, Commands::AgentId)
                            .to(Agents::Table, Agents::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Global idempotency key: duplicate submissions resolve to this row
        manager
            .create_index(
                Index::create()
                    .name("idx_commands_request_id")
                    .table(Commands::Table)
                    .col(Commands::RequestId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Serving order for pending-commands polls
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX idx_commands_agent_pending \
                 ON commands (agent_id, priority DESC, created_at ASC) \
                 WHERE status = 'pending'",
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_commands_created_at")
                    .table(Commands::Table)
                    .col(Commands::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Commands::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(CommandTriggerEnum::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(CommandStatusEnum::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(CommandKindEnum::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Commands {
    Table,
    Id,
    AgentId,
    RequestId,
    Kind,
    TargetMode,
    TargetPoolId,
    Priority,
    TerminateWaitSeconds,
    Status,
    Payload,
    PreState,
    PostState,
    Result,
    Trigger,
    UserId,
    Version,
    CreatedAt,
    ExecutedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum Agents {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum CommandKindEnum {
    #[sea_orm(iden = "command_kind")]
    Enum,
    #[sea_orm(iden = "switch")]
    Switch,
    #[sea_orm(iden = "launch_instance")]
    LaunchInstance,
    #[sea_orm(iden = "terminate_instance")]
    TerminateInstance,
    #[sea_orm(iden = "promote_replica")]
    PromoteReplica,
    #[sea_orm(iden = "apply_config")]
    ApplyConfig,
    #[sea_orm(iden = "self_destruct")]
    SelfDestruct,
}

#[derive(DeriveIden)]
enum CommandStatusEnum {
    #[sea_orm(iden = "command_status")]
    Enum,
    #[sea_orm(iden = "pending")]
    Pending,
    #[sea_orm(iden = "executing")]
    Executing,
    #[sea_orm(iden = "completed")]
    Completed,
    #[sea_orm(iden = "failed")]
    Failed,
}

#[derive(DeriveIden)]
enum CommandTriggerEnum {
    #[sea_orm(iden = "command_trigger")]
    Enum,
    #[sea_orm(iden = "manual")]
    Manual,
    #[sea_orm(iden = "ml")]
    Ml,
    #[sea_orm(iden = "emergency")]
    Emergency,
    #[sea_orm(iden = "scheduled")]
    Scheduled,
}
