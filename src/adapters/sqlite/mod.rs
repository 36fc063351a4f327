//! SQLite persistence for task-intel records.

pub mod connection;
pub mod migrations;
pub mod record_store;

pub use connection::{create_pool, create_test_pool, database_url, ConnectionError, PoolConfig};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use record_store::SqliteRecordStore;

use sqlx::SqlitePool;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

pub async fn initialize_database(database_url: &str, config: PoolConfig) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(database_url, Some(config)).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Open (creating if needed) the record store at `path` with default pool settings.
pub async fn open_record_store(path: impl AsRef<Path>) -> Result<SqliteRecordStore, DatabaseError> {
    open_record_store_with(path, PoolConfig::default()).await
}

pub async fn open_record_store_with(
    path: impl AsRef<Path>,
    config: PoolConfig,
) -> Result<SqliteRecordStore, DatabaseError> {
    let pool = initialize_database(&database_url(path), config).await?;
    Ok(SqliteRecordStore::new(pool))
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}
