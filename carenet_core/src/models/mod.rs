use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

use crate::config::CarenetConfig;
use crate::error::DbError;

mod message;
pub mod migrator;

pub use message::{AttachmentRef, AttachmentUpload, Message, Reaction};

pub async fn open_or_create_db(config: &CarenetConfig) -> Result<DatabaseConnection, DbError> {
    let connection_string = format!("sqlite://{}?mode=rwc", config.database_path.display());

    Database::connect(&connection_string)
        .await
        .map_err(DbError::Connect)
}

pub async fn migrate_up(db: &DatabaseConnection) -> Result<(), DbError> {
    migrator::Migrator::up(db, None)
        .await
        .map_err(DbError::Migrate)
}
