pub use sea_orm_migration::prelude::*;

mod m20260101_000001_access_schema;
mod m20260108_000001_relationship_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_access_schema::Migration),
            Box::new(m20260108_000001_relationship_indexes::Migration),
        ]
    }
}
