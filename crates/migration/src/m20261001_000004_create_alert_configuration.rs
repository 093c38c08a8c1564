use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Per-target notification settings. At most one row per target.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AlertConfiguration::Table)
                    .if_not_exists()
                    .col(pk_auto(AlertConfiguration::Id))
                    .col(integer(AlertConfiguration::TargetId).not_null())
                    .col(string_null(AlertConfiguration::EmailRecipient))
                    .col(string_null(AlertConfiguration::WebhookUrl))
                    .col(
                        boolean(AlertConfiguration::NotifyOnDown)
                            .not_null()
                            .default(true),
                    )
                    .col(
                        boolean(AlertConfiguration::NotifyOnUp)
                            .not_null()
                            .default(true),
                    )
                    .col(
                        timestamp_with_time_zone(AlertConfiguration::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(AlertConfiguration::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_alert_configuration_target_unique")
                    .table(AlertConfiguration::Table)
                    .col(AlertConfiguration::TargetId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_alert_configuration_target_unique")
                    .table(AlertConfiguration::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(AlertConfiguration::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum AlertConfiguration {
    Table,
    Id,
    TargetId,
    EmailRecipient,
    WebhookUrl,
    NotifyOnDown,
    NotifyOnUp,
    CreatedAt,
    UpdatedAt,
}
