use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Incident::Table)
                    .if_not_exists()
                    .col(pk_auto(Incident::Id))
                    .col(integer(Incident::TargetId).not_null())
                    .col(
                        ColumnDef::new(Incident::Kind)
                            .string()
                            .not_null()
                            .comment("Incident kind, currently only 'unreachable'"),
                    )
                    .col(text(Incident::Description).not_null())
                    .col(timestamp_with_time_zone(Incident::OpenedAt).not_null())
                    .col(timestamp_with_time_zone_null(Incident::ResolvedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_incident_target_resolved_at")
                    .table(Incident::Table)
                    .col(Incident::TargetId)
                    .col(Incident::ResolvedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_incident_target_resolved_at")
                    .table(Incident::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Incident::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Incident {
    Table,
    Id,
    TargetId,
    Kind,
    Description,
    OpenedAt,
    ResolvedAt,
}
