//! Draft tasks and deduplication decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::task::{StrategicScore, Task};
use crate::domain::text;

/// Lifecycle of a draft.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    /// Produced by the generator, not yet deduplicated
    #[default]
    Generated,
    /// Survived deduplication, shown to the user
    Kept,
    /// Dropped by deduplication or an exclusion directive
    Suppressed,
    /// Promoted to a task
    Accepted,
    /// Rejected by the user
    Discarded,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Kept => "kept",
            Self::Suppressed => "suppressed",
            Self::Accepted => "accepted",
            Self::Discarded => "discarded",
        }
    }

    /// Whether the user can still accept or discard this draft.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Kept)
    }
}

/// A proposed task that has not been accepted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftTask {
    pub id: Uuid,
    pub text: String,
    /// The coverage gap this draft addresses
    pub gap: String,
    /// Provenance scope, compared against `Task::document_id`
    pub document_id: Option<String>,
    pub status: DraftStatus,
    pub fingerprint: String,
    /// Closest existing task found during deduplication
    pub nearest_task_id: Option<String>,
    pub similarity: Option<f64>,
    /// Similarity fell in the audit band just under the duplicate threshold
    pub borderline: bool,
    /// Produced or compared via a heuristic fallback
    pub degraded: bool,
    pub strategic_estimate: Option<StrategicScore>,
    pub created_at: DateTime<Utc>,
}

impl DraftTask {
    pub fn new(text: impl Into<String>, gap: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: Uuid::new_v4(),
            fingerprint: text::fingerprint(&text),
            text,
            gap: gap.into(),
            document_id: None,
            status: DraftStatus::Generated,
            nearest_task_id: None,
            similarity: None,
            borderline: false,
            degraded: false,
            strategic_estimate: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_document(mut self, document_id: Option<String>) -> Self {
        self.document_id = document_id;
        self
    }

    pub fn with_strategic(mut self, estimate: Option<StrategicScore>) -> Self {
        self.strategic_estimate = estimate;
        self
    }

    /// Record the deduplication verdict on the draft itself.
    pub fn apply_decision(&mut self, decision: &DedupDecision) {
        self.nearest_task_id.clone_from(&decision.matched_task_id);
        self.similarity = decision.similarity;
        self.borderline = decision.borderline;
        self.degraded |= decision.degraded;
        self.status = if decision.is_duplicate {
            DraftStatus::Suppressed
        } else {
            DraftStatus::Kept
        };
    }

    /// View as a task, for comparing later drafts of the same batch against it.
    pub fn as_candidate(&self) -> Task {
        self.clone().into_task()
    }

    /// Promote to a task. The task id is the draft id.
    pub fn into_task(self) -> Task {
        let mut task = Task::generated(self.id.to_string(), self.text);
        task.document_id = self.document_id;
        task.strategic_score = self.strategic_estimate;
        task
    }
}

/// Outcome of comparing one draft with the existing tasks.
///
/// A duplicate verdict is a decision, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupDecision {
    pub draft_id: Uuid,
    pub is_duplicate: bool,
    pub matched_task_id: Option<String>,
    pub similarity: Option<f64>,
    pub borderline: bool,
    /// Decided by fingerprint equality, no similarity computed
    pub via_fingerprint: bool,
    /// Lexical fallback was used for at least one comparison
    pub degraded: bool,
}

impl DedupDecision {
    pub fn unique(draft_id: Uuid) -> Self {
        Self {
            draft_id,
            is_duplicate: false,
            matched_task_id: None,
            similarity: None,
            borderline: false,
            via_fingerprint: false,
            degraded: false,
        }
    }
}

/// Why a draft was not shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuppressionReason {
    Duplicate {
        matched_task_id: String,
        similarity: f64,
        via_fingerprint: bool,
    },
    ExcludedTopic {
        reflection_id: Uuid,
        topic: String,
    },
}

/// A draft kept only for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressedDraft {
    pub draft: DraftTask,
    pub reason: SuppressionReason,
    pub suppressed_at: DateTime<Utc>,
}

impl SuppressedDraft {
    pub fn new(mut draft: DraftTask, reason: SuppressionReason) -> Self {
        draft.status = DraftStatus::Suppressed;
        Self {
            draft,
            reason,
            suppressed_at: Utc::now(),
        }
    }
}
