//! Audit trail for pass timings, coverage results and dedup decisions.
//!
//! Entries are kept in a bounded in-memory ring for inspection and
//! forwarded to the record store's append-only log. A store failure is
//! logged and does not fail the pass that produced the entry.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::domain::models::{AuditEntry, AuditKind};
use crate::domain::ports::RecordStore;

/// Configuration for the audit log.
#[derive(Debug, Clone)]
pub struct AuditLogConfig {
    /// Maximum entries to keep in memory.
    pub max_entries: usize,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

pub struct AuditLog {
    config: AuditLogConfig,
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    store: Option<Arc<dyn RecordStore>>,
}

impl AuditLog {
    pub fn new(config: AuditLogConfig, store: Option<Arc<dyn RecordStore>>) -> Self {
        Self {
            config,
            entries: Arc::new(RwLock::new(VecDeque::new())),
            store,
        }
    }

    /// Memory-only log.
    pub fn in_memory() -> Self {
        Self::new(AuditLogConfig::default(), None)
    }

    pub fn with_store(store: Arc<dyn RecordStore>) -> Self {
        Self::new(AuditLogConfig::default(), Some(store))
    }

    /// Append an entry.
    pub async fn record(&self, entry: AuditEntry) {
        if let Some(store) = &self.store {
            if let Err(err) = store.append_audit(&entry).await {
                warn!(kind = entry.kind().as_str(), error = %err, "Failed to persist audit entry");
            }
        }

        let mut entries = self.entries.write().await;
        while entries.len() >= self.config.max_entries.max(1) {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries in append order, optionally filtered by kind.
    pub async fn entries(&self, kind: Option<AuditKind>) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| kind.is_none_or(|k| e.kind() == k))
            .cloned()
            .collect()
    }

    /// Entry counts per kind.
    pub async fn counts(&self) -> HashMap<AuditKind, usize> {
        let entries = self.entries.read().await;
        let mut counts = HashMap::new();
        for entry in entries.iter() {
            *counts.entry(entry.kind()).or_insert(0) += 1;
        }
        counts
    }
}
