use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Pools::Table)
                    .if_not_exists()
                    .col(pk_uuid(Pools::Id))
                    .col(string_len(Pools::InstanceType, 255).not_null())
                    .col(string_len(Pools::Region, 100).not_null())
                    .col(string_len(Pools::Az, 100).not_null())
                    .col(double_null(Pools::MeanBootSeconds))
                    .col(integer(Pools::BootSamples).not_null().default(0))
                    .col(
                        timestamp_with_time_zone(Pools::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Pools::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // A pool is the (instance_type, region, az) triple
        manager
            .create_index(
                Index::create()
                    .name("idx_pools_type_region_az")
                    .table(Pools::Table)
                    .col(Pools::InstanceType)
                    .col(Pools::Region)
                    .col(Pools::Az)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER pools_touch_updated_at
                    BEFORE UPDATE ON pools
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
            .execute_unprepared("DROP TRIGGER IF EXISTS pools_touch_updated_at ON pools")
            .await?;

        manager
            .drop_table(Table::drop().table(Pools::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Pools {
    Table,
    Id,
    InstanceType,
    Region,
    Az,
    MeanBootSeconds,
    BootSamples,
    CreatedAt,
    UpdatedAt,
}
