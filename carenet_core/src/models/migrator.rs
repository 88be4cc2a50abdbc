use sea_orm_migration::prelude::*;

mod m20261019_000001_create_threads_table;
mod m20261019_000002_create_messages_table;
mod m20261019_000003_create_reactions_table;
mod m20261019_000004_create_attachments_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261019_000001_create_threads_table::Migration),
            Box::new(m20261019_000002_create_messages_table::Migration),
            Box::new(m20261019_000003_create_reactions_table::Migration),
            Box::new(m20261019_000004_create_attachments_table::Migration),
        ]
    }
}

#[cfg(test)]
use sea_orm::{Database, DbErr};

#[tokio::test]
async fn test_migrations_okay() -> Result<(), DbErr> {
    let db = Database::connect("sqlite::memory:").await?;
    let schema_manager = SchemaManager::new(&db);

    Migrator::refresh(&db).await?;

    assert!(schema_manager.has_table("thread").await?);
    assert!(schema_manager.has_table("message").await?);
    assert!(schema_manager.has_table("reaction").await?);
    assert!(schema_manager.has_table("attachment").await?);

    Ok(())
}
