use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Properties::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Properties::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Properties::Name).string().not_null())
                    .col(ColumnDef::new(Properties::DeletedAt).date_time())
                    .col(ColumnDef::new(Properties::CreatedAt).date_time().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Animals::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Animals::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Animals::PropertyId).uuid().not_null())
                    .col(ColumnDef::new(Animals::Tag).string().not_null())
                    .col(ColumnDef::new(Animals::GroupLabel).string())
                    .col(ColumnDef::new(Animals::Sex).string_len(1).not_null())
                    .col(ColumnDef::new(Animals::BirthDate).date())
                    .col(ColumnDef::new(Animals::DeletedAt).date_time())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-animal-property_id")
                            .from(Animals::Table, Animals::PropertyId)
                            .to(Properties::Table, Properties::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Treatments::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Treatments::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Treatments::AnimalId).uuid().not_null())
                    .col(ColumnDef::new(Treatments::Description).text().not_null())
                    .col(ColumnDef::new(Treatments::StartedOn).date().not_null())
                    .col(ColumnDef::new(Treatments::ReturnDate).date())
                    .foreign_key(&mut animal_fk("fk-treatment-animal_id", Treatments::Table, Treatments::AnimalId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Vaccinations::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Vaccinations::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Vaccinations::AnimalId).uuid().not_null())
                    .col(ColumnDef::new(Vaccinations::Vaccine).string().not_null())
                    .col(ColumnDef::new(Vaccinations::ScheduledDate).date().not_null())
                    .col(ColumnDef::new(Vaccinations::AppliedOn).date())
                    .foreign_key(&mut animal_fk(
                        "fk-vaccination-animal_id",
                        Vaccinations::Table,
                        Vaccinations::AnimalId,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Breedings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Breedings::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Breedings::AnimalId).uuid().not_null())
                    .col(ColumnDef::new(Breedings::BreedingDate).date().not_null())
                    .col(ColumnDef::new(Breedings::Status).string_len(16).not_null())
                    .col(ColumnDef::new(Breedings::DiagnosedOn).date())
                    .foreign_key(&mut animal_fk("fk-breeding-animal_id", Breedings::Table, Breedings::AnimalId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Milkings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Milkings::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Milkings::AnimalId).uuid().not_null())
                    .col(ColumnDef::new(Milkings::MilkedOn).date().not_null())
                    .col(ColumnDef::new(Milkings::Liters).double().not_null())
                    .foreign_key(&mut animal_fk("fk-milking-animal_id", Milkings::Table, Milkings::AnimalId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Weighings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Weighings::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Weighings::AnimalId).uuid().not_null())
                    .col(ColumnDef::new(Weighings::WeighedOn).date().not_null())
                    .col(ColumnDef::new(Weighings::WeightKg).double().not_null())
                    .foreign_key(&mut animal_fk("fk-weighing-animal_id", Weighings::Table, Weighings::AnimalId))
                    .to_owned(),
            )
            .await?;

        // Evaluators scan these by animal and date window every night.
        manager
            .create_index(
                Index::create()
                    .name("idx_milkings_animal_date")
                    .table(Milkings::Table)
                    .col(Milkings::AnimalId)
                    .col(Milkings::MilkedOn)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_breedings_animal_date")
                    .table(Breedings::Table)
                    .col(Breedings::AnimalId)
                    .col(Breedings::BreedingDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Weighings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Milkings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Breedings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Vaccinations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Treatments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Animals::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Properties::Table).to_owned())
            .await
    }
}

fn animal_fk<T, C>(name: &str, table: T, column: C) -> ForeignKeyCreateStatement
where
    T: IntoIden + 'static,
    C: IntoIden + 'static,
{
    ForeignKey::create()
        .name(name)
        .from(table, column)
        .to(Animals::Table, Animals::Id)
        .on_delete(ForeignKeyAction::Cascade)
        .on_update(ForeignKeyAction::Cascade)
        .to_owned()
}

#[derive(DeriveIden)]
enum Properties {
    Table,
    Id,
    Name,
    DeletedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Animals {
    Table,
    Id,
    PropertyId,
    Tag,
    GroupLabel,
    Sex,
    BirthDate,
    DeletedAt,
}

#[derive(DeriveIden)]
enum Treatments {
    Table,
    Id,
    AnimalId,
    Description,
    StartedOn,
    ReturnDate,
}

#[derive(DeriveIden)]
enum Vaccinations {
    Table,
    Id,
    AnimalId,
    Vaccine,
    ScheduledDate,
    AppliedOn,
}

#[derive(DeriveIden)]
enum Breedings {
    Table,
    Id,
    AnimalId,
    BreedingDate,
    Status,
    DiagnosedOn,
}

#[derive(DeriveIden)]
enum Milkings {
    Table,
    Id,
    AnimalId,
    MilkedOn,
    Liters,
}

#[derive(DeriveIden)]
enum Weighings {
    Table,
    Id,
    AnimalId,
    WeighedOn,
    WeightKg,
}
