use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250315_000003_create_material_submittals_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MaterialSubmittals::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MaterialSubmittals::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialSubmittals::ProjectId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialSubmittals::SubmittedBy)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MaterialSubmittals::Name).string().not_null())
                    .col(
                        ColumnDef::new(MaterialSubmittals::Specification)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MaterialSubmittals::Quantity)
                            .decimal_len(18, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialSubmittals::UnitOfMeasure)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialSubmittals::Status)
                            .string_len(32)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(MaterialSubmittals::ReviewedBy).uuid().null())
                    .col(ColumnDef::new(MaterialSubmittals::ReviewNotes).text().null())
                    .col(
                        ColumnDef::new(MaterialSubmittals::ReviewedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MaterialSubmittals::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(MaterialSubmittals::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialSubmittals::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_material_submittals_project_status")
                    .table(MaterialSubmittals::Table)
                    .col(MaterialSubmittals::ProjectId)
                    .col(MaterialSubmittals::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MaterialSubmittals::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MaterialSubmittals {
    Table,
    Id,
    ProjectId,
    SubmittedBy,
    Name,
    Specification,
    Quantity,
    UnitOfMeasure,
    Status,
    ReviewedBy,
    ReviewNotes,
    ReviewedAt,
    Version,
    CreatedAt,
    UpdatedAt,
}
