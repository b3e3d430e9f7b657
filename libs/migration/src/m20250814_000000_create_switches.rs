use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Switches::Table)
                    .if_not_exists()
                    .col(pk_uuid(Switches::Id))
                    .col(uuid(Switches::AgentId).not_null())
                    .col(uuid_null(Switches::CommandId))
                    .col(string_len(Switches::RequestId, 255).not_null())
                    .col(string_len(Switches::OldInstanceId, 255).not_null())
                    .col(string_len(Switches::NewInstanceId, 255).not_null())
                    .col(string_len(Switches::OldMode, 32).not_null())
                    .col(string_len(Switches::NewMode, 32).not_null())
                    .col(string_len(Switches::Trigger, 32).not_null())
                    .col(double_null(Switches::OnDemandPrice))
                    .col(double_null(Switches::OldSpotPrice))
                    .col(double_null(Switches::NewSpotPrice))
                    .col(double_null(Switches::DowntimeSeconds))
                    .col(timestamp_with_time_zone(Switches::InitiatedAt).not_null())
                    .col(timestamp_with_time_zone(Switches::CompletedAt).not_null())
                    .col(timestamp_with_time_zone_null(Switches::OldTerminatedAt))
                    .col(
                        timestamp_with_time_zone(Switches::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_switches_agent")
                            .from(Switches::Table, Switches::AgentId)
                            .to(Agents::Table, Agents::Id)
                            // Switch history is preserved even if the agent goes away
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_switches_agent_created")
                    .table(Switches::Table)
                    .col(Switches::AgentId)
                    .col(Switches::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_switches_request_id")
                    .table(Switches::Table)
                    .col(Switches::RequestId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Switches::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Switches {
    Table,
    Id,
    AgentId,
    CommandId,
    RequestId,
    OldInstanceId,
    NewInstanceId,
    OldMode,
    NewMode,
    Trigger,
    OnDemandPrice,
    OldSpotPrice,
    NewSpotPrice,
    DowntimeSeconds,
    InitiatedAt,
    CompletedAt,
    OldTerminatedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Agents {
    Table,
    Id,
}
