//! Persistence port.
//!
//! The core needs only read-by-id, write-replace and append-to-audit-log
//! over opaque JSON records. No query language is assumed.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::models::AuditEntry;

/// Record families kept in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Task,
    Reflection,
    PriorityPlan,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Reflection => "reflection",
            Self::PriorityPlan => "priority_plan",
        }
    }
}

/// Opaque record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read one record, `None` when absent.
    async fn read(&self, kind: RecordKind, id: &str) -> DomainResult<Option<Value>>;

    /// Insert or fully replace one record.
    async fn write_replace(&self, kind: RecordKind, id: &str, body: Value) -> DomainResult<()>;

    /// Append to the audit log. Entries are never rewritten.
    async fn append_audit(&self, entry: &AuditEntry) -> DomainResult<()>;
}

/// Read and deserialize a record.
pub async fn read_typed<T: DeserializeOwned>(
    store: &dyn RecordStore,
    kind: RecordKind,
    id: &str,
) -> DomainResult<Option<T>> {
    store
        .read(kind, id)
        .await?
        .map(serde_json::from_value)
        .transpose()
        .map_err(Into::into)
}

/// Serialize and write-replace a record.
pub async fn write_typed<T: Serialize + Sync>(
    store: &dyn RecordStore,
    kind: RecordKind,
    id: &str,
    record: &T,
) -> DomainResult<()> {
    let body = serde_json::to_value(record)?;
    store.write_replace(kind, id, body).await
}
