use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create event_severity enum
        manager
            .create_type(
                Type::create()
                    .as_enum(EventSeverityEnum::Enum)
                    .values([
                        EventSeverityEnum::Debug,
                        EventSeverityEnum::Info,
                        EventSeverityEnum::Warning,
                        EventSeverityEnum::Critical,
                    ])
                    .to_owned(),
            )
            .await?;

        // Server-push channel: pending rows flushed to SSE connections,
        // auto-expired after a short TTL
        manager
            .create_table(
                Table::create()
                    .table(SseEvents::Table)
                    .if_not_exists()
                    .col(pk_uuid(SseEvents::Id))
                    .col(uuid(SseEvents::ClientId).not_null())
                    .col(string_len(SseEvents::EventType, 64).not_null())
                    .col(json_binary(SseEvents::Payload).not_null().default("{}"))
                    .col(boolean(SseEvents::Delivered).not_null().default(false))
                    .col(
                        timestamp_with_time_zone(SseEvents::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone(SseEvents::ExpiresAt).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sse_events_client_created")
                    .table(SseEvents::Table)
                    .col(SseEvents::ClientId)
                    .col(SseEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sse_events_expires_at")
                    .table(SseEvents::Table)
                    .col(SseEvents::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        // Append-only audit log, range-partitioned on created_at for O(1)
        // retention drops. Raw DDL: sea-query has no partition support.
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE system_events (
                    id BIGINT GENERATED BY DEFAULT AS IDENTITY,
                    client_id UUID,
                    agent_id UUID,
                    severity event_severity NOT NULL DEFAULT 'info',
                    event_type VARCHAR(64) NOT NULL,
                    context JSONB NOT NULL DEFAULT '{}',
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    PRIMARY KEY (id, created_at)
                ) PARTITION BY RANGE (created_at)
                "#,
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE TABLE system_events_default PARTITION OF system_events DEFAULT",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX idx_system_events_agent_created \
                 ON system_events (agent_id, created_at)",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX idx_system_events_type ON system_events (event_type)",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS system_events")
            .await?;

        manager
            .drop_table(Table::drop().table(SseEvents::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(EventSeverityEnum::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum SseEvents {
    Table,
    Id,
    ClientId,
    EventType,
    Payload,
    Delivered,
    CreatedAt,
    ExpiresAt,
}

#[derive(DeriveIden)]
enum EventSeverityEnum {
    #[sea_orm(iden = "event_severity")]
    Enum,
    #[sea_orm(iden = "debug")]
    Debug,
    #[sea_orm(iden = "info")]
    Info,
    #[sea_orm(iden = "warning")]
    Warning,
    #[sea_orm(iden = "critical")]
    Critical,
}
