//! Pool setup for the record store database.
//!
//! The record store is a single small file written by one session at a
//! time and read by the CLI, so the pool stays narrow. WAL lets readers run
//! next to the one writer; the busy timeout covers a second process holding
//! the write lock.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::StorageConfig;

const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Record store pool could not open: {0}")]
    PoolCreationFailed(#[source] sqlx::Error),
    #[error("Not a SQLite database URL: {0}")]
    InvalidDatabaseUrl(String),
    #[error("Record store directory could not be created: {0}")]
    DirectoryCreationFailed(#[source] std::io::Error),
}

/// Pool sizing and lock waits for one record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    /// Wait for a free pooled connection
    pub acquire_timeout: Duration,
    /// Wait on a database locked by another writer
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for PoolConfig {
    fn from(config: &StorageConfig) -> Self {
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        Self {
            max_connections: config.max_connections.max(1),
            acquire_timeout: busy_timeout,
            busy_timeout,
        }
    }
}

/// `sqlite:` URL for a filesystem path.
pub fn database_url(path: impl AsRef<Path>) -> String {
    format!("sqlite:{}", path.as_ref().display())
}

/// Open a pool on `database_url`, creating the file and its directory.
pub async fn create_pool(database_url: &str, config: Option<PoolConfig>) -> Result<SqlitePool, ConnectionError> {
    let config = config.unwrap_or_default();
    ensure_database_directory(database_url)?;

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|_| ConnectionError::InvalidDatabaseUrl(database_url.to_string()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(config.busy_timeout);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(1)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(ConnectionError::PoolCreationFailed)
}

/// In-memory pool for tests. One connection, since every connection to
/// `:memory:` would otherwise see its own empty database.
pub async fn create_test_pool() -> Result<SqlitePool, ConnectionError> {
    let options = SqliteConnectOptions::from_str(MEMORY_URL)
        .map_err(|_| ConnectionError::InvalidDatabaseUrl(MEMORY_URL.to_string()))?;

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(ConnectionError::PoolCreationFailed)
}

fn ensure_database_directory(database_url: &str) -> Result<(), ConnectionError> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(ConnectionError::DirectoryCreationFailed)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url() {
        assert_eq!(database_url("/tmp/x.db"), "sqlite:/tmp/x.db");
    }

    #[test]
    fn test_pool_config_follows_storage_settings() {
        let storage = StorageConfig {
            max_connections: 0,
            busy_timeout_ms: 250,
            ..StorageConfig::default()
        };
        let pool = PoolConfig::from(&storage);
        assert_eq!(pool.max_connections, 1);
        assert_eq!(pool.busy_timeout, Duration::from_millis(250));
        assert_eq!(pool.acquire_timeout, Duration::from_millis(250));

        let defaults = PoolConfig::default();
        assert_eq!(defaults.max_connections, 4);
        assert_eq!(defaults.busy_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_create_pool_creates_parent_directory_in_wal_mode() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.db");

        let pool = create_pool(&database_url(&path), None).await.unwrap();
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode").fetch_one(&pool).await.unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn test_memory_urls_need_no_directory() {
        assert!(ensure_database_directory(MEMORY_URL).is_ok());
        assert!(ensure_database_directory("sqlite:").is_ok());
    }
}
