use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MonitoredTarget::Table)
                    .if_not_exists()
                    .col(pk_auto(MonitoredTarget::Id))
                    .col(string(MonitoredTarget::Name).not_null())
                    .col(string(MonitoredTarget::Address).not_null())
                    .col(integer(MonitoredTarget::IntervalSecs).not_null())
                    .col(
                        boolean(MonitoredTarget::Active)
                            .not_null()
                            .default(true),
                    )
                    .col(
                        timestamp_with_time_zone(MonitoredTarget::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(MonitoredTarget::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_monitored_target_active")
                    .table(MonitoredTarget::Table)
                    .col(MonitoredTarget::Active)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_monitored_target_active")
                    .table(MonitoredTarget::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(MonitoredTarget::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum MonitoredTarget {
    Table,
    Id,
    Name,
    Address,
    IntervalSecs,
    Active,
    CreatedAt,
    UpdatedAt,
}
