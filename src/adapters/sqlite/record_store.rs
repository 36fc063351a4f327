//! SQLite implementation of the record store port.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AuditEntry, AuditKind};
use crate::domain::ports::{RecordKind, RecordStore};

#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Audit entries in append order, optionally filtered by kind.
    pub async fn audit_entries(&self, kind: Option<AuditKind>) -> DomainResult<Vec<AuditEntry>> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query("SELECT entry FROM audit_log WHERE kind = ? ORDER BY seq")
                    .bind(kind.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT entry FROM audit_log ORDER BY seq")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter()
            .map(|row| {
                let entry: String = row.get("entry");
                serde_json::from_str(&entry).map_err(DomainError::from)
            })
            .collect()
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn read(&self, kind: RecordKind, id: &str) -> DomainResult<Option<Value>> {
        let row = sqlx::query("SELECT body FROM records WHERE kind = ? AND id = ?")
            .bind(kind.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            let body: String = r.get("body");
            serde_json::from_str(&body).map_err(DomainError::from)
        })
        .transpose()
    }

    async fn write_replace(&self, kind: RecordKind, id: &str, body: Value) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO records (kind, id, body, updated_at) VALUES (?, ?, ?, ?)
               ON CONFLICT(kind, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at"#,
        )
        .bind(kind.as_str())
        .bind(id)
        .bind(body.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> DomainResult<()> {
        let body = serde_json::to_string(entry)?;
        sqlx::query("INSERT INTO audit_log (kind, entry, recorded_at) VALUES (?, ?, ?)")
            .bind(entry.kind().as_str())
            .bind(body)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
