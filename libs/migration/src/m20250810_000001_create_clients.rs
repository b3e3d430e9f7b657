use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create client_plan enum
        manager
            .create_type(
                Type::create()
                    .as_enum(ClientPlanEnum::Enum)
                    .values([
                        ClientPlanEnum::Free,
                        ClientPlanEnum::Pro,
                        ClientPlanEnum::Enterprise,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Clients::Table)
                    .if_not_exists()
                    .col(pk_uuid(Clients::Id))
                    .col(string_len(Clients::Name, 255).not_null())
                    .col(string_len(Clients::AuthTokenHash, 64).not_null())
                    .col(
                        ColumnDef::new(Clients::Plan)
                            .enumeration(
                                ClientPlanEnum::Enum,
                                [
                                    ClientPlanEnum::Free,
                                    ClientPlanEnum::Pro,
                                    ClientPlanEnum::Enterprise,
                                ],
                            )
                            .not_null()
                            .default("free"),
                    )
                    .col(integer(Clients::MaxAgents).not_null().default(10))
                    .col(
                        boolean(Clients::DefaultAutoSwitchEnabled)
                            .not_null()
                            .default(true),
                    )
                    .col(
                        boolean(Clients::DefaultManualReplicaEnabled)
                            .not_null()
                            .default(false),
                    )
                    .col(
                        boolean(Clients::DefaultAutoTerminate)
                            .not_null()
                            .default(true),
                    )
                    .col(
                        timestamp_with_time_zone(Clients::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Clients::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Token lookup path for every authenticated request
        manager
            .create_index(
                Index::create()
                    .name("idx_clients_auth_token_hash")
                    .table(Clients::Table)
                    .col(Clients::AuthTokenHash)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_clients_name")
                    .table(Clients::Table)
                    .col(Clients::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // A client's default policy must stay mutually exclusive
        manager
            .get_connection()
            .execute_unprepared(
                "ALTER TABLE clients ADD CONSTRAINT clients_default_policy_exclusive \
                 CHECK (NOT (default_auto_switch_enabled AND default_manual_replica_enabled))",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER clients_touch_updated_at
                    BEFORE UPDATE ON clients
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
            .execute_unprepared("DROP TRIGGER IF EXISTS clients_touch_updated_at ON clients")
            .await?;

        manager
            .drop_table(Table::drop().table(Clients::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(ClientPlanEnum::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Clients {
    Table,
    Id,
    Name,
    AuthTokenHash,
    Plan,
    MaxAgents,
    DefaultAutoSwitchEnabled,
    DefaultManualReplicaEnabled,
    DefaultAutoTerminate,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ClientPlanEnum {
    #[sea_orm(iden = "client_plan")]
    Enum,
    #[sea_orm(iden = "free")]
    Free,
    #[sea_orm(iden = "pro")]
    Pro,
    #[sea_orm(iden = "enterprise")]
    Enterprise,
}
