use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alerts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Alerts::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Alerts::Domain).string_len(16).not_null())
                    .col(ColumnDef::new(Alerts::Severity).small_integer().not_null())
                    .col(ColumnDef::new(Alerts::AnimalId).uuid().not_null())
                    .col(ColumnDef::new(Alerts::PropertyId).uuid().not_null())
                    .col(ColumnDef::new(Alerts::GroupLabel).string())
                    .col(ColumnDef::new(Alerts::LocationLabel).string())
                    .col(ColumnDef::new(Alerts::Reason).string().not_null())
                    .col(ColumnDef::new(Alerts::Note).text())
                    .col(ColumnDef::new(Alerts::ClinicalNarrative).text())
                    .col(ColumnDef::new(Alerts::AlertDate).date().not_null())
                    .col(
                        ColumnDef::new(Alerts::Acknowledged)
                            .boolean()
                            .default(false)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alerts::OriginEventType).string_len(32))
                    .col(ColumnDef::new(Alerts::OriginEventId).uuid())
                    .col(ColumnDef::new(Alerts::OpenSlot).string())
                    .col(ColumnDef::new(Alerts::CreatedAt).date_time().not_null())
                    .col(ColumnDef::new(Alerts::UpdatedAt).date_time().not_null())
                    .to_owned(),
            )
            .await?;

        // At most one open alert per lineage. NULLs (acknowledged rows, or
        // alerts without an origin) never collide.
        manager
            .create_index(
                Index::create()
                    .name("uq_alerts_open_slot")
                    .table(Alerts::Table)
                    .col(Alerts::OpenSlot)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_alerts_lineage")
                    .table(Alerts::Table)
                    .col(Alerts::OriginEventType)
                    .col(Alerts::OriginEventId)
                    .col(Alerts::AnimalId)
                    .col(Alerts::Domain)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_alerts_due")
                    .table(Alerts::Table)
                    .col(Alerts::AlertDate)
                    .col(Alerts::Severity)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alerts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Alerts {
    Table,
    Id,
    Domain,
    Severity,
    AnimalId,
    PropertyId,
    GroupLabel,
    LocationLabel,
    Reason,
    Note,
    ClinicalNarrative,
    AlertDate,
    Acknowledged,
    OriginEventType,
    OriginEventId,
    OpenSlot,
    CreatedAt,
    UpdatedAt,
}
