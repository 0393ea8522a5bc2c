pub use sea_orm_migration::prelude::*;

mod m20241012_081530_create_event_table;
mod m20241012_082214_create_card_table;
mod m20241012_083047_create_contribution_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20241012_081530_create_event_table::Migration),
            Box::new(m20241012_082214_create_card_table::Migration),
            Box::new(m20241012_083047_create_contribution_table::Migration),
        ]
    }
}
