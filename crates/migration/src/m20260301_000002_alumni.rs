use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alumni::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Alumni::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Alumni::FirstName).string().not_null())
                    .col(ColumnDef::new(Alumni::LastName).string().not_null())
                    .col(ColumnDef::new(Alumni::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(Alumni::GraduationYear).integer())
                    .col(ColumnDef::new(Alumni::Diploma).string())
                    .col(ColumnDef::new(Alumni::City).string())
                    .col(ColumnDef::new(Alumni::Company).string())
                    .col(ColumnDef::new(Alumni::JobTitle).string())
                    .col(ColumnDef::new(Alumni::Phone).string())
                    .col(ColumnDef::new(Alumni::LinkedinUrl).string())
                    .col(ColumnDef::new(Alumni::AvatarUrl).string())
                    .col(
                        ColumnDef::new(Alumni::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Alumni::Status)
                            .string_len(16)
                            .not_null()
                            .default("unlinked"),
                    )
                    .col(ColumnDef::new(Alumni::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(Alumni::UpdatedAt).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        // Directory listing sorts by name.
        manager
            .create_index(
                Index::create()
                    .name("idx_alumni_name")
                    .table(Alumni::Table)
                    .col(Alumni::LastName)
                    .col(Alumni::FirstName)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_alumni_status")
                    .table(Alumni::Table)
                    .col(Alumni::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alumni::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Alumni {
    Table,
    Id,
    FirstName,
    LastName,
    Email,
    GraduationYear,
    Diploma,
    City,
    Company,
    JobTitle,
    Phone,
    LinkedinUrl,
    AvatarUrl,
    IsActive,
    Status,
    CreatedAt,
    UpdatedAt,
}
