//! SQLite schema migration management.

use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to execute migration {version}: {source}")]
    ExecutionError { version: i64, #[source] source: sqlx::Error },
    #[error("Failed to get schema version: {0}")]
    VersionCheckError(#[source] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: String,
    pub sql: String,
}

impl Migration {
    /// Individual statements, comments stripped.
    fn statements(&self) -> impl Iterator<Item = String> + '_ {
        self.sql
            .split(';')
            .map(|chunk| {
                chunk
                    .lines()
                    .filter(|line| !line.trim_start().starts_with("--"))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .filter(|statement| !statement.trim().is_empty())
    }
}

pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply every migration newer than the recorded schema version.
    pub async fn run_embedded_migrations(&self, migrations: Vec<Migration>) -> Result<usize, MigrationError> {
        self.ensure_migrations_table().await?;
        let current_version = self.get_current_version().await?;
        let pending: Vec<_> = migrations.into_iter().filter(|m| m.version > current_version).collect();

        for migration in &pending {
            self.apply_migration(migration).await?;
        }

        Ok(pending.len())
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                description TEXT
            )"
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MigrationError::ExecutionError { version: 0, source: e })?;
        Ok(())
    }

    pub async fn get_current_version(&self) -> Result<i64, MigrationError> {
        let result: Option<(i64,)> = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_optional(&self.pool)
            .await
            .map_err(MigrationError::VersionCheckError)?;
        Ok(result.map_or(0, |(v,)| v))
    }

    async fn apply_migration(&self, migration: &Migration) -> Result<(), MigrationError> {
        let failed = |e| MigrationError::ExecutionError { version: migration.version, source: e };
        let mut tx = self.pool.begin().await.map_err(failed)?;

        for statement in migration.statements() {
            sqlx::query(&statement).execute(&mut *tx).await.map_err(failed)?;
        }

        sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;

        tx.commit().await.map_err(failed)
    }
}

pub fn records_schema_migration() -> Migration {
    Migration {
        version: 1,
        description: "Records and audit log".to_string(),
        sql: include_str!("../../../migrations/001_records.sql").to_string(),
    }
}

pub fn all_embedded_migrations() -> Vec<Migration> {
    vec![records_schema_migration()]
}
