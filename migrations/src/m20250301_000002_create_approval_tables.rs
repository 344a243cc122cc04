use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000002_create_approval_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApprovalWorkflows::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ApprovalWorkflows::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApprovalWorkflows::SubjectType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ApprovalWorkflows::SubjectId).uuid().not_null())
                    .col(
                        ColumnDef::new(ApprovalWorkflows::SubjectOwnerId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ApprovalWorkflows::ProjectId).uuid().not_null())
                    .col(
                        ColumnDef::new(ApprovalWorkflows::WorkflowType)
                            .string_len(16)
                            .not_null()
                            .default("sequential"),
                    )
                    .col(
                        ColumnDef::new(ApprovalWorkflows::RequiredApprovers)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApprovalWorkflows::CompletedApprovers)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApprovalWorkflows::ApprovalSequence)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApprovalWorkflows::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ApprovalWorkflows::PriorityLevel)
                            .integer()
                            .not_null()
                            .default(2),
                    )
                    .col(
                        ColumnDef::new(ApprovalWorkflows::EstimatedCompletionDate)
                            .date()
                            .null(),
                    )
                    .col(ColumnDef::new(ApprovalWorkflows::Conditions).json().not_null())
                    .col(
                        ColumnDef::new(ApprovalWorkflows::RevisionCycle)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ApprovalWorkflows::CreatedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(ApprovalWorkflows::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(ApprovalWorkflows::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ApprovalWorkflows::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApprovalWorkflows::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_approval_workflows_subject")
                    .table(ApprovalWorkflows::Table)
                    .col(ApprovalWorkflows::SubjectType)
                    .col(ApprovalWorkflows::SubjectId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ApprovalActions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ApprovalActions::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ApprovalActions::WorkflowId).uuid().not_null())
                    .col(ColumnDef::new(ApprovalActions::ActorId).uuid().not_null())
                    .col(
                        ColumnDef::new(ApprovalActions::ActionType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ApprovalActions::Comments).text().null())
                    .col(ColumnDef::new(ApprovalActions::Metadata).json().not_null())
                    .col(ColumnDef::new(ApprovalActions::DelegatedBy).uuid().null())
                    .col(ColumnDef::new(ApprovalActions::OriginalApprover).uuid().null())
                    .col(
                        ColumnDef::new(ApprovalActions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_approval_actions_workflow")
                            .from(ApprovalActions::Table, ApprovalActions::WorkflowId)
                            .to(ApprovalWorkflows::Table, ApprovalWorkflows::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_approval_actions_workflow")
                    .table(ApprovalActions::Table)
                    .col(ApprovalActions::WorkflowId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ApprovalActions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ApprovalWorkflows::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ApprovalWorkflows {
    Table,
    Id,
    SubjectType,
    SubjectId,
    SubjectOwnerId,
    ProjectId,
    WorkflowType,
    RequiredApprovers,
    CompletedApprovers,
    ApprovalSequence,
    Status,
    PriorityLevel,
    EstimatedCompletionDate,
    Conditions,
    RevisionCycle,
    CreatedBy,
    Version,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ApprovalActions {
    Table,
    Id,
    WorkflowId,
    ActorId,
    ActionType,
    Comments,
    Metadata,
    DelegatedBy,
    OriginalApprover,
    CreatedAt,
}
