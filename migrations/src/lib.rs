pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_procurement_tables;
mod m20250301_000002_create_approval_tables;
mod m20250315_000003_create_material_submittals_table;
mod m20250320_000004_unique_pending_workflow;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_procurement_tables::Migration),
            Box::new(m20250301_000002_create_approval_tables::Migration),
            Box::new(m20250315_000003_create_material_submittals_table::Migration),
            Box::new(m20250320_000004_unique_pending_workflow::Migration),
        ]
    }
}
