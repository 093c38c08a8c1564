use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Append-only probe results, one row per check.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CheckOutcome::Table)
                    .if_not_exists()
                    .col(pk_auto(CheckOutcome::Id))
                    .col(integer(CheckOutcome::TargetId).not_null())
                    .col(integer_null(CheckOutcome::StatusCode))
                    .col(big_integer(CheckOutcome::LatencyMs).not_null())
                    .col(boolean(CheckOutcome::Reachable).not_null())
                    .col(string_null(CheckOutcome::Error))
                    .col(
                        timestamp_with_time_zone(CheckOutcome::CheckedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Serves both "previous outcome" and history range queries.
        manager
            .create_index(
                Index::create()
                    .name("idx_check_outcome_target_checked_at")
                    .table(CheckOutcome::Table)
                    .col(CheckOutcome::TargetId)
                    .col(CheckOutcome::CheckedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_check_outcome_target_checked_at")
                    .table(CheckOutcome::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(CheckOutcome::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum CheckOutcome {
    Table,
    Id,
    TargetId,
    StatusCode,
    LatencyMs,
    Reachable,
    Error,
    CheckedAt,
}
