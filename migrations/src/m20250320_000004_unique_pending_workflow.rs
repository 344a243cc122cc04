use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250320_000004_unique_pending_workflow"
    }
}

// Partial index: one pending workflow per subject. Postgres and SQLite both
// accept the WHERE clause; sea-query has no builder for it.
const CREATE_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS \
     uq_approval_workflows_pending_subject ON approval_workflows (subject_type, subject_id) \
     WHERE status = 'pending'";

const DROP_INDEX: &str = "DROP INDEX IF EXISTS uq_approval_workflows_pending_subject";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(CREATE_INDEX)
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DROP_INDEX)
            .await?;
        Ok(())
    }
}
