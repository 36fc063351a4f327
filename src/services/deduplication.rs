//! Deduplication of generated drafts against existing tasks.
//!
//! A draft whose fingerprint equals any existing task's hash is a certain
//! duplicate. Otherwise the draft is compared with the tasks sharing its
//! document scope, and the best similarity is classified against the
//! configured thresholds. Borderline matches are kept and flagged for
//! audit. Every decision is recorded with the draft, match and score.
//!
//! Verdicts are memoized per (draft text, document scope, comparison set)
//! in a bounded LRU. Verdicts reached through the lexical fallback are not
//! memoized, so the embedding comparison is retried once it is available.

use futures::future::join_all;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::models::{
    AuditEntry, DedupConfig, DedupDecision, DraftTask, SuppressedDraft, SuppressionReason, Task,
};
use crate::services::audit_log::AuditLog;
use crate::services::similarity::SimilarityEngine;

/// Similarity cutoffs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupThresholds {
    /// At or above: duplicate
    pub duplicate: f64,
    /// At or above (and under `duplicate`): borderline
    pub borderline: f64,
}

impl Default for DedupThresholds {
    fn default() -> Self {
        Self::from(&DedupConfig::default())
    }
}

impl From<&DedupConfig> for DedupThresholds {
    fn from(config: &DedupConfig) -> Self {
        Self {
            duplicate: config.duplicate_threshold,
            borderline: config.borderline_threshold,
        }
    }
}

/// Where a similarity value falls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityBand {
    Duplicate,
    Borderline,
    Distinct,
}

/// Classify one similarity value. Bounds are inclusive lower edges.
pub fn classify(similarity: f64, thresholds: &DedupThresholds) -> SimilarityBand {
    if similarity >= thresholds.duplicate {
        SimilarityBand::Duplicate
    } else if similarity >= thresholds.borderline {
        SimilarityBand::Borderline
    } else {
        SimilarityBand::Distinct
    }
}

/// Result of filtering a batch of drafts.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Surviving drafts, in input order, status `Kept`
    pub kept: Vec<DraftTask>,
    pub suppressed: Vec<SuppressedDraft>,
    pub decisions: Vec<DedupDecision>,
    pub degraded: bool,
}

/// Memoized verdicts kept before the least recently used is evicted
pub const DEFAULT_MEMO_CAPACITY: usize = 4096;

/// Draft fingerprint, draft document scope, comparison-set digest
type MemoKey = (String, Option<String>, String);

pub struct DeduplicationService {
    engine: Arc<SimilarityEngine>,
    thresholds: DedupThresholds,
    audit: Arc<AuditLog>,
    scope_locks: Mutex<HashMap<Option<String>, Arc<Mutex<()>>>>,
    memo: Mutex<LruCache<MemoKey, DedupDecision>>,
}

impl DeduplicationService {
    pub fn new(engine: Arc<SimilarityEngine>, thresholds: DedupThresholds, audit: Arc<AuditLog>) -> Self {
        Self::with_memo_capacity(engine, thresholds, audit, DEFAULT_MEMO_CAPACITY)
    }

    /// Like [`Self::new`] with an explicit memo bound (at least 1).
    pub fn with_memo_capacity(
        engine: Arc<SimilarityEngine>,
        thresholds: DedupThresholds,
        audit: Arc<AuditLog>,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            engine,
            thresholds,
            audit,
            scope_locks: Mutex::new(HashMap::new()),
            memo: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of memoized verdicts.
    pub async fn memoized(&self) -> usize {
        self.memo.lock().await.len()
    }

    pub fn thresholds(&self) -> DedupThresholds {
        self.thresholds
    }

    async fn scope_lock(&self, scope: Option<&String>) -> Arc<Mutex<()>> {
        let mut locks = self.scope_locks.lock().await;
        Arc::clone(locks.entry(scope.cloned()).or_default())
    }

    /// Decide whether `draft` duplicates one of `existing`.
    ///
    /// Decisions for the same draft text in the same scope against the same
    /// task set are memoized, so repeated calls return the identical verdict
    /// and are audited once.
    pub async fn check_duplicate(&self, draft: &DraftTask, existing: &[Task]) -> DedupDecision {
        let lock = self.scope_lock(draft.document_id.as_ref()).await;
        let _scope = lock.lock().await;

        let key = (
            draft.fingerprint.clone(),
            draft.document_id.clone(),
            candidate_digest(existing),
        );
        if let Some(cached) = self.memo.lock().await.get(&key) {
            debug!(draft_id = %draft.id, "Reusing memoized dedup decision");
            return DedupDecision {
                draft_id: draft.id,
                ..cached.clone()
            };
        }

        let (decision, matched_text) = self.decide(draft, existing).await;

        info!(
            draft_id = %draft.id,
            is_duplicate = decision.is_duplicate,
            borderline = decision.borderline,
            matched_task_id = decision.matched_task_id.as_deref().unwrap_or("-"),
            similarity = decision.similarity.unwrap_or(0.0),
            via_fingerprint = decision.via_fingerprint,
            degraded = decision.degraded,
            "Dedup decision"
        );
        self.audit
            .record(AuditEntry::DedupDecision {
                decision: decision.clone(),
                draft_text: draft.text.clone(),
                matched_text,
            })
            .await;

        if !decision.degraded {
            self.memo.lock().await.put(key, decision.clone());
        }
        decision
    }

    async fn decide(&self, draft: &DraftTask, existing: &[Task]) -> (DedupDecision, Option<String>) {
        if let Some(task) = existing.iter().find(|t| task_hash(t) == draft.fingerprint) {
            let decision = DedupDecision {
                draft_id: draft.id,
                is_duplicate: true,
                matched_task_id: Some(task.id.clone()),
                similarity: Some(1.0),
                borderline: false,
                via_fingerprint: true,
                degraded: false,
            };
            return (decision, Some(task.text.clone()));
        }

        let mut candidates: Vec<&Task> = existing
            .iter()
            .filter(|t| t.document_id == draft.document_id)
            .collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));

        let mut best: Option<(&Task, f64)> = None;
        let mut degraded = false;
        for task in candidates {
            let score = self.engine.similarity(&draft.text, &task.text).await;
            degraded |= score.degraded;
            if best.is_none_or(|(_, value)| score.value > value) {
                best = Some((task, score.value));
            }
        }

        let Some((task, similarity)) = best else {
            return (DedupDecision::unique(draft.id), None);
        };

        let band = classify(similarity, &self.thresholds);
        let decision = DedupDecision {
            draft_id: draft.id,
            is_duplicate: band == SimilarityBand::Duplicate,
            matched_task_id: Some(task.id.clone()),
            similarity: Some(similarity),
            borderline: band == SimilarityBand::Borderline,
            via_fingerprint: false,
            degraded,
        };
        (decision, Some(task.text.clone()))
    }

    /// Filter a batch of drafts.
    ///
    /// Scopes run concurrently; drafts within a scope run in order, and each
    /// kept draft joins the comparison set for the drafts after it.
    pub async fn filter_drafts(&self, drafts: Vec<DraftTask>, existing: &[Task]) -> DedupOutcome {
        let mut by_scope: BTreeMap<Option<String>, Vec<(usize, DraftTask)>> = BTreeMap::new();
        for (index, draft) in drafts.into_iter().enumerate() {
            by_scope
                .entry(draft.document_id.clone())
                .or_default()
                .push((index, draft));
        }

        let groups = by_scope.into_values().map(|group| self.filter_scope(group, existing));
        let mut kept = Vec::new();
        let mut outcome = DedupOutcome::default();

        for (group_kept, suppressed, decisions) in join_all(groups).await {
            kept.extend(group_kept);
            outcome.suppressed.extend(suppressed);
            outcome.decisions.extend(decisions);
        }

        kept.sort_by_key(|(index, _)| *index);
        outcome.kept = kept.into_iter().map(|(_, draft)| draft).collect();
        outcome.degraded = outcome.decisions.iter().any(|d| d.degraded);
        outcome
    }

    async fn filter_scope(
        &self,
        group: Vec<(usize, DraftTask)>,
        existing: &[Task],
    ) -> (Vec<(usize, DraftTask)>, Vec<SuppressedDraft>, Vec<DedupDecision>) {
        let mut pool = existing.to_vec();
        let mut kept = Vec::new();
        let mut suppressed = Vec::new();
        let mut decisions = Vec::new();

        for (index, mut draft) in group {
            let decision = self.check_duplicate(&draft, &pool).await;
            draft.apply_decision(&decision);

            if decision.is_duplicate {
                let reason = SuppressionReason::Duplicate {
                    matched_task_id: decision.matched_task_id.clone().unwrap_or_default(),
                    similarity: decision.similarity.unwrap_or(1.0),
                    via_fingerprint: decision.via_fingerprint,
                };
                let record = SuppressedDraft::new(draft, reason);
                self.audit.record(AuditEntry::Suppression(record.clone())).await;
                suppressed.push(record);
            } else {
                pool.push(draft.as_candidate());
                kept.push((index, draft));
            }
            decisions.push(decision);
        }

        (kept, suppressed, decisions)
    }
}

fn task_hash(task: &Task) -> std::borrow::Cow<'_, str> {
    if task.deduplication_hash.is_empty() {
        std::borrow::Cow::Owned(crate::domain::text::fingerprint(&task.text))
    } else {
        std::borrow::Cow::Borrowed(task.deduplication_hash.as_str())
    }
}

/// Order-independent digest of the comparison set.
fn candidate_digest(existing: &[Task]) -> String {
    let mut lines: Vec<String> = existing
        .iter()
        .map(|t| {
            format!(
                "{}\u{1f}{}\u{1f}{}",
                t.id,
                task_hash(t),
                t.document_id.as_deref().unwrap_or("")
            )
        })
        .collect();
    lines.sort();
    hex::encode(Sha256::digest(lines.join("\n").as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::inference::MockInferenceProvider;
    use crate::domain::models::{AuditKind, DraftStatus};
    use crate::services::inference_client::InferenceClient;
    use crate::services::retry_controller::{RetryController, RetryPolicy};

    async fn service_with(pins: &[(&str, Vec<f32>)]) -> (DeduplicationService, Arc<AuditLog>) {
        let (service, audit, _) = service_parts(pins, DEFAULT_MEMO_CAPACITY).await;
        (service, audit)
    }

    async fn service_parts(
        pins: &[(&str, Vec<f32>)],
        memo_capacity: usize,
    ) -> (DeduplicationService, Arc<AuditLog>, Arc<MockInferenceProvider>) {
        let provider = Arc::new(MockInferenceProvider::new());
        for (text, vector) in pins {
            provider.set_embedding(text, vector.clone()).await;
        }
        let retry = Arc::new(RetryController::new(RetryPolicy::default(), 4));
        let client = Arc::new(InferenceClient::new(provider.clone(), retry));
        let engine = Arc::new(SimilarityEngine::new(client));
        let audit = Arc::new(AuditLog::in_memory());
        let service = DeduplicationService::with_memo_capacity(
            engine,
            DedupThresholds::default(),
            audit.clone(),
            memo_capacity,
        );
        (service, audit, provider)
    }

    fn unit(cos: f32) -> Vec<f32> {
        vec![cos, (1.0 - cos * cos).sqrt()]
    }

    #[test]
    fn test_classify_bands() {
        let t = DedupThresholds::default();
        assert_eq!(classify(0.85, &t), SimilarityBand::Duplicate);
        assert_eq!(classify(0.849, &t), SimilarityBand::Borderline);
        assert_eq!(classify(0.80, &t), SimilarityBand::Borderline);
        assert_eq!(classify(0.79, &t), SimilarityBand::Distinct);
    }

    #[tokio::test]
    async fn test_fingerprint_match_short_circuits() {
        let (service, _) = service_with(&[]).await;
        let existing = vec![Task::manual("t1", "Implement Apple Pay")];
        let draft = DraftTask::new("implement  apple pay", "payments");

        let decision = service.check_duplicate(&draft, &existing).await;
        assert!(decision.is_duplicate);
        assert!(decision.via_fingerprint);
        assert_eq!(decision.similarity, Some(1.0));
        assert_eq!(decision.matched_task_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_threshold_and_borderline() {
        let (service, _) = service_with(&[
            ("Existing checkout task", vec![1.0, 0.0]),
            ("Close paraphrase", unit(0.90)),
            ("Loose paraphrase", unit(0.84)),
        ])
        .await;
        let existing = vec![Task::manual("t1", "Existing checkout task")];

        let dup = service
            .check_duplicate(&DraftTask::new("Close paraphrase", "gap"), &existing)
            .await;
        assert!(dup.is_duplicate);
        assert!(!dup.borderline);

        let border = service
            .check_duplicate(&DraftTask::new("Loose paraphrase", "gap"), &existing)
            .await;
        assert!(!border.is_duplicate);
        assert!(border.borderline);
        assert_eq!(border.matched_task_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_similarity_only_within_document_scope() {
        let (service, _) = service_with(&[
            ("Scoped task", vec![1.0, 0.0]),
            ("Scoped paraphrase", unit(0.95)),
        ])
        .await;
        let existing = vec![Task::manual("t1", "Scoped task").with_document("doc-a")];
        let draft = DraftTask::new("Scoped paraphrase", "gap").with_document(Some("doc-b".to_string()));

        let decision = service.check_duplicate(&draft, &existing).await;
        assert!(!decision.is_duplicate);
        assert!(decision.matched_task_id.is_none());
    }

    #[tokio::test]
    async fn test_repeat_decisions_are_memoized_and_audited_once() {
        let (service, audit) = service_with(&[
            ("Base", vec![1.0, 0.0]),
            ("Near", unit(0.9)),
        ])
        .await;
        let existing = vec![Task::manual("t1", "Base")];
        let draft = DraftTask::new("Near", "gap");

        let first = service.check_duplicate(&draft, &existing).await;
        let second = service.check_duplicate(&draft, &existing).await;
        assert_eq!(first, second);
        assert_eq!(audit.entries(Some(AuditKind::Dedup)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_same_draft_in_two_documents_is_judged_per_scope() {
        let (service, _) = service_with(&[
            ("Scoped task", vec![1.0, 0.0]),
            ("Scoped paraphrase", unit(0.95)),
        ])
        .await;
        let existing = vec![Task::manual("t1", "Scoped task").with_document("doc-a")];

        let in_a = DraftTask::new("Scoped paraphrase", "gap").with_document(Some("doc-a".to_string()));
        let in_b = DraftTask::new("Scoped paraphrase", "gap").with_document(Some("doc-b".to_string()));

        let first = service.check_duplicate(&in_a, &existing).await;
        assert!(first.is_duplicate);
        assert_eq!(first.matched_task_id.as_deref(), Some("t1"));

        let second = service.check_duplicate(&in_b, &existing).await;
        assert!(!second.is_duplicate);
        assert!(second.matched_task_id.is_none());
        assert_eq!(second.draft_id, in_b.id);
        assert_eq!(service.memoized().await, 2);
    }

    #[tokio::test]
    async fn test_degraded_verdicts_are_not_memoized() {
        let (service, audit, provider) = service_parts(
            &[("Base", vec![1.0, 0.0]), ("Near", unit(0.9))],
            DEFAULT_MEMO_CAPACITY,
        )
        .await;
        let existing = vec![Task::manual("t1", "Base")];
        let draft = DraftTask::new("Near", "gap");

        provider
            .set_embed_outage(Some(crate::domain::errors::InferenceError::MalformedResponse(
                "embeddings offline".to_string(),
            )))
            .await;
        let fallback = service.check_duplicate(&draft, &existing).await;
        assert!(fallback.degraded);
        assert!(!fallback.is_duplicate);
        assert_eq!(service.memoized().await, 0);

        provider.set_embed_outage(None).await;
        let recovered = service.check_duplicate(&draft, &existing).await;
        assert!(!recovered.degraded);
        assert!(recovered.is_duplicate);
        assert_eq!(service.memoized().await, 1);
        assert_eq!(audit.entries(Some(AuditKind::Dedup)).await.len(), 2);
    }

    #[tokio::test]
    async fn test_memo_is_bounded() {
        let (service, _, _) = service_parts(&[], 2).await;
        let existing = vec![Task::manual("t1", "Implement Apple Pay")];

        for text in ["Add checkout analytics", "Run pricing experiment", "Hire a designer"] {
            service.check_duplicate(&DraftTask::new(text, "gap"), &existing).await;
        }
        assert_eq!(service.memoized().await, 2);
    }

    #[tokio::test]
    async fn test_filter_drafts_dedups_within_batch() {
        let (service, audit) = service_with(&[]).await;
        let existing = vec![Task::manual("t1", "Implement Apple Pay")];
        let drafts = vec![
            DraftTask::new("Add checkout analytics", "measurement"),
            DraftTask::new("Implement Apple Pay", "payments"),
            DraftTask::new("add checkout analytics", "measurement"),
        ];
        let first_id = drafts[0].id;

        let outcome = service.filter_drafts(drafts, &existing).await;

        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].id, first_id);
        assert_eq!(outcome.kept[0].status, DraftStatus::Kept);
        assert_eq!(outcome.suppressed.len(), 2);
        assert_eq!(outcome.decisions.len(), 3);
        // Second analytics draft matched the first kept draft
        assert!(outcome.suppressed.iter().any(|s| matches!(
            &s.reason,
            SuppressionReason::Duplicate { matched_task_id, .. } if *matched_task_id == first_id.to_string()
        )));
        let suppression_entries = audit
            .entries(Some(AuditKind::Dedup))
            .await
            .into_iter()
            .filter(|e| matches!(e, AuditEntry::Suppression(_)))
            .count();
        assert_eq!(suppression_entries, 2);
    }
}
