//! Audit trail records.
//!
//! The schema is additive-only: new fields must be optional so older
//! entries keep deserializing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::coverage::CoverageResult;
use crate::domain::models::draft::{DedupDecision, SuppressedDraft};

/// Which pass produced an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Coverage,
    Quality,
    Drafts,
    Dedup,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coverage => "coverage",
            Self::Quality => "quality",
            Self::Drafts => "drafts",
            Self::Dedup => "dedup",
        }
    }
}

/// Timing record appended once per pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub kind: AuditKind,
    pub duration_ms: u64,
    pub task_count: usize,
    pub timestamp: DateTime<Utc>,
    pub degraded: bool,
}

impl AuditRecord {
    pub fn new(kind: AuditKind, duration_ms: u64, task_count: usize, degraded: bool) -> Self {
        Self {
            kind,
            duration_ms,
            task_count,
            timestamp: Utc::now(),
            degraded,
        }
    }
}

/// Anything appended to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum AuditEntry {
    Pass(AuditRecord),
    Coverage(CoverageResult),
    DedupDecision {
        decision: DedupDecision,
        draft_text: String,
        matched_text: Option<String>,
    },
    Suppression(SuppressedDraft),
}

impl AuditEntry {
    pub fn kind(&self) -> AuditKind {
        match self {
            Self::Pass(record) => record.kind,
            Self::Coverage(_) => AuditKind::Coverage,
            Self::DedupDecision { .. } | Self::Suppression(_) => AuditKind::Dedup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_record_serializes_flat_fields() {
        let entry = AuditEntry::Pass(AuditRecord::new(AuditKind::Quality, 12, 4, true));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["entry"], "pass");
        assert_eq!(json["duration_ms"], 12);
        assert_eq!(json["task_count"], 4);
        assert_eq!(json["degraded"], true);
        assert_eq!(entry.kind(), AuditKind::Quality);
    }
}
