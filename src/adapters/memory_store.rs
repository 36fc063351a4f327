//! In-process record store.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::AuditEntry;
use crate::domain::ports::{RecordKind, RecordStore};

/// Record store backed by in-memory maps.
///
/// `set_unavailable(true)` makes every call fail, for exercising the
/// persistence-failure path.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<HashMap<(RecordKind, String), Value>>>,
    audit: Arc<RwLock<Vec<AuditEntry>>>,
    unavailable: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of the audit log in append order.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.read().await.clone()
    }

    pub async fn record_count(&self, kind: RecordKind) -> usize {
        let records = self.records.read().await;
        records.keys().filter(|(k, _)| *k == kind).count()
    }

    fn check_available(&self) -> DomainResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(DomainError::PersistenceUnavailable(
                "in-memory store marked unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn read(&self, kind: RecordKind, id: &str) -> DomainResult<Option<Value>> {
        self.check_available()?;
        let records = self.records.read().await;
        Ok(records.get(&(kind, id.to_string())).cloned())
    }

    async fn write_replace(&self, kind: RecordKind, id: &str, body: Value) -> DomainResult<()> {
        self.check_available()?;
        let mut records = self.records.write().await;
        records.insert((kind, id.to_string()), body);
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> DomainResult<()> {
        self.check_available()?;
        self.audit.write().await.push(entry.clone());
        Ok(())
    }
}
