use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // No foreign keys: requests outlive deleted profiles and accounts.
        manager
            .create_table(
                Table::create()
                    .table(ProfileUpdateRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProfileUpdateRequests::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProfileUpdateRequests::AlumniId).string().not_null())
                    .col(ColumnDef::new(ProfileUpdateRequests::UserId).string().not_null())
                    .col(ColumnDef::new(ProfileUpdateRequests::Changes).text().not_null())
                    .col(
                        ColumnDef::new(ProfileUpdateRequests::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ProfileUpdateRequests::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProfileUpdateRequests::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_profile_update_requests_alumni_id")
                    .table(ProfileUpdateRequests::Table)
                    .col(ProfileUpdateRequests::AlumniId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_profile_update_requests_status_created")
                    .table(ProfileUpdateRequests::Table)
                    .col(ProfileUpdateRequests::Status)
                    .col(ProfileUpdateRequests::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(ProfileUpdateRequests::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum ProfileUpdateRequests {
    Table,
    Id,
    AlumniId,
    UserId,
    Changes,
    Status,
    CreatedAt,
    UpdatedAt,
}
