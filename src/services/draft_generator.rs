//! Draft task generation for coverage gaps.
//!
//! A single completion proposes drafts from the outcome, the uncovered
//! facets, recent reflections and a compact summary of existing tasks.
//! Each reflection is listed with its recency weight so older notes steer
//! less.
//! Drafts landing on an excluded topic are suppressed, the rest go through
//! deduplication before anything is returned.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::domain::models::{
    AuditEntry, AuditKind, AuditRecord, CoverageResult, DedupDecision, DraftConfig, DraftTask,
    Reflection, ReflectionDirective, StrategicScore, SuppressedDraft, SuppressionReason, Task,
};
use crate::domain::ports::{Prompt, ResponseSchema};
use crate::services::audit_log::AuditLog;
use crate::services::deduplication::DeduplicationService;
use crate::services::inference_client::InferenceClient;
use crate::services::reflection_interpreter::{excluded_topics, matches_topic};

pub const DRAFT_SCHEMA: &str = "draft_tasks";

#[derive(Debug, Clone, Deserialize)]
struct DraftList {
    drafts: Vec<RawDraft>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDraft {
    text: String,
    gap: String,
    #[serde(default)]
    impact: Option<f64>,
    #[serde(default)]
    effort: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
}

pub fn draft_schema() -> ResponseSchema {
    ResponseSchema::new(
        DRAFT_SCHEMA,
        vec!["drafts"],
        json!({
            "type": "object",
            "properties": {
                "drafts": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "text": {"type": "string"},
                            "gap": {"type": "string"},
                            "impact": {"type": "number", "minimum": 0, "maximum": 10},
                            "effort": {"type": "number", "minimum": 0, "maximum": 10},
                            "confidence": {"type": "number", "minimum": 0, "maximum": 1}
                        },
                        "required": ["text", "gap", "impact", "effort", "confidence"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["drafts"],
            "additionalProperties": false
        }),
    )
}

/// Inputs for one generation.
#[derive(Debug, Clone, Copy)]
pub struct DraftContext<'a> {
    pub outcome: &'a str,
    /// Active reflections, most recent first
    pub reflections: &'a [&'a Reflection],
    /// Half-life for the recency weights shown next to each reflection
    pub half_life_hours: f64,
    pub directives: &'a [ReflectionDirective],
    pub coverage: &'a CoverageResult,
    /// Tasks drafts are deduplicated against
    pub existing: &'a [Task],
    /// Provenance scope given to new drafts
    pub document_id: Option<&'a str>,
}

/// Drafts shown to the user plus what was held back.
#[derive(Debug, Clone, Default)]
pub struct GenerationOutcome {
    pub kept: Vec<DraftTask>,
    pub suppressed: Vec<SuppressedDraft>,
    pub decisions: Vec<DedupDecision>,
    pub degraded: bool,
}

pub struct DraftGenerator {
    client: Arc<InferenceClient>,
    dedup: Arc<DeduplicationService>,
    config: DraftConfig,
    audit: Arc<AuditLog>,
}

impl DraftGenerator {
    pub fn new(
        client: Arc<InferenceClient>,
        dedup: Arc<DeduplicationService>,
        config: DraftConfig,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            client,
            dedup,
            config,
            audit,
        }
    }

    /// Propose drafts for the gaps in `ctx.coverage`. Never fails.
    pub async fn generate_drafts(&self, ctx: DraftContext<'_>) -> GenerationOutcome {
        let started = Instant::now();
        let prompt = build_prompt(&ctx, &self.config);

        let call = self
            .client
            .complete_or_else("drafts", &prompt, &draft_schema(), |_| DraftList {
                drafts: heuristic_drafts(ctx.coverage),
            })
            .await;
        let degraded = call.degraded;

        let drafts: Vec<DraftTask> = call
            .value
            .drafts
            .into_iter()
            .filter(|raw| !raw.text.trim().is_empty())
            .take(self.config.max_drafts)
            .map(|raw| {
                let estimate = match (raw.impact, raw.effort, raw.confidence) {
                    (Some(impact), Some(effort), Some(confidence)) => {
                        Some(StrategicScore::new(impact, effort, confidence))
                    }
                    _ => None,
                };
                let mut draft = DraftTask::new(raw.text.trim(), raw.gap.trim())
                    .with_document(ctx.document_id.map(str::to_string))
                    .with_strategic(estimate);
                draft.degraded = degraded;
                draft
            })
            .collect();

        let generated = drafts.len();
        let (allowed, mut suppressed) = self.drop_excluded_topics(drafts, ctx.directives).await;
        let dedup = self.dedup.filter_drafts(allowed, ctx.existing).await;
        suppressed.extend(dedup.suppressed);

        let outcome = GenerationOutcome {
            kept: dedup.kept,
            suppressed,
            decisions: dedup.decisions,
            degraded: degraded || dedup.degraded,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            generated,
            kept = outcome.kept.len(),
            suppressed = outcome.suppressed.len(),
            degraded = outcome.degraded,
            duration_ms,
            "Drafts generated"
        );
        self.audit
            .record(AuditEntry::Pass(AuditRecord::new(
                AuditKind::Drafts,
                duration_ms,
                ctx.existing.len(),
                outcome.degraded,
            )))
            .await;

        outcome
    }

    async fn drop_excluded_topics(
        &self,
        drafts: Vec<DraftTask>,
        directives: &[ReflectionDirective],
    ) -> (Vec<DraftTask>, Vec<SuppressedDraft>) {
        let excluded = excluded_topics(directives);
        let mut allowed = Vec::with_capacity(drafts.len());
        let mut suppressed = Vec::new();

        for draft in drafts {
            match excluded.iter().find(|d| matches_topic(d, &draft.text)) {
                Some(directive) => {
                    warn!(
                        draft_id = %draft.id,
                        reflection_id = %directive.reflection_id,
                        topic = %directive.topic,
                        "Draft lands on an excluded topic"
                    );
                    let record = SuppressedDraft::new(
                        draft,
                        SuppressionReason::ExcludedTopic {
                            reflection_id: directive.reflection_id,
                            topic: directive.topic.clone(),
                        },
                    );
                    self.audit.record(AuditEntry::Suppression(record.clone())).await;
                    suppressed.push(record);
                }
                None => allowed.push(draft),
            }
        }

        (allowed, suppressed)
    }
}

fn build_prompt(ctx: &DraftContext<'_>, config: &DraftConfig) -> Prompt {
    let gaps = if ctx.coverage.missing_facets.is_empty() {
        format!("Estimated coverage is {}%.", ctx.coverage.percentage)
    } else {
        format!(
            "Estimated coverage is {}%. Uncovered facets: {}.",
            ctx.coverage.percentage,
            ctx.coverage.missing_facets.join(", ")
        )
    };

    let now = Utc::now();
    let reflections = ctx
        .reflections
        .iter()
        .map(|r| {
            let weight = r.recency_weight(now, ctx.half_life_hours);
            format!("- (weight {weight:.2}) {}", r.text)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut summary: Vec<&Task> = ctx.existing.iter().collect();
    summary.sort_by(|a, b| {
        b.strategic_or_neutral()
            .priority
            .total_cmp(&a.strategic_or_neutral().priority)
            .then_with(|| a.id.cmp(&b.id))
    });
    let summary = summary
        .into_iter()
        .take(config.summary_task_limit)
        .map(|t| format!("- {}", t.text))
        .collect::<Vec<_>>()
        .join("\n");

    let avoid = excluded_topics(ctx.directives)
        .iter()
        .map(|d| d.topic.as_str())
        .collect::<Vec<_>>();

    let mut user = format!("Outcome: {}\n{gaps}\n", ctx.outcome);
    if !reflections.is_empty() {
        user.push_str(&format!("\nUser notes, most recent first. Weight 1.00 is new and older notes count less:\n{reflections}\n"));
    }
    if !summary.is_empty() {
        user.push_str(&format!("\nExisting tasks (do not repeat these):\n{summary}\n"));
    }
    if !avoid.is_empty() {
        user.push_str(&format!("\nAvoid these topics entirely: {}\n", avoid.join(", ")));
    }

    Prompt::new(
        format!(
            "You propose concrete, actionable tasks that close the gaps between a task list \
             and its outcome. Propose at most {} tasks. For each give the task text, the gap it \
             addresses, and estimates of impact (0-10), effort (0-10) and confidence (0-1).",
            config.max_drafts
        ),
        user,
    )
}

/// One short draft per uncovered facet, worded so sibling drafts stay distinct.
fn heuristic_drafts(coverage: &CoverageResult) -> Vec<RawDraft> {
    coverage
        .missing_facets
        .iter()
        .map(|facet| RawDraft {
            text: format!("Define and deliver {facet}"),
            gap: facet.clone(),
            impact: None,
            effort: None,
            confidence: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::inference::{MockInferenceProvider, MockReply};
    use crate::domain::models::reflection::active_most_recent_first;
    use crate::domain::models::{DirectiveKind, DraftStatus};
    use crate::services::deduplication::DedupThresholds;
    use crate::services::retry_controller::{RetryController, RetryPolicy};
    use crate::services::similarity::SimilarityEngine;
    use chrono::Duration;

    fn generator(provider: Arc<MockInferenceProvider>, max_drafts: usize) -> (DraftGenerator, Arc<AuditLog>) {
        let retry = Arc::new(RetryController::new(RetryPolicy::default(), 4));
        let client = Arc::new(InferenceClient::new(provider, retry));
        let audit = Arc::new(AuditLog::in_memory());
        let engine = Arc::new(SimilarityEngine::new(client.clone()));
        let dedup = Arc::new(DeduplicationService::new(
            engine,
            DedupThresholds::default(),
            audit.clone(),
        ));
        let config = DraftConfig {
            max_drafts,
            ..DraftConfig::default()
        };
        (DraftGenerator::new(client, dedup, config, audit.clone()), audit)
    }

    fn coverage(missing: &[&str]) -> CoverageResult {
        CoverageResult {
            percentage: 40,
            task_count_considered: 1,
            timestamp: Utc::now(),
            facets: Vec::new(),
            missing_facets: missing.iter().map(|s| (*s).to_string()).collect(),
            low_confidence: true,
            partial: false,
            degraded: false,
        }
    }

    fn exclude_docs() -> ReflectionDirective {
        ReflectionDirective {
            reflection_id: uuid::Uuid::new_v4(),
            reflection_text: "ignore documentation tasks".to_string(),
            kind: DirectiveKind::Exclude,
            topic: "documentation".to_string(),
            keywords: vec!["documentation".to_string()],
            weight: 1.0,
        }
    }

    #[tokio::test]
    async fn test_drafts_are_capped_and_filtered() {
        let provider = Arc::new(MockInferenceProvider::new());
        provider
            .push_reply(
                DRAFT_SCHEMA,
                MockReply::Respond(json!({"drafts": [
                    {"text": "Add one-click checkout", "gap": "checkout", "impact": 8, "effort": 4, "confidence": 0.7},
                    {"text": "Write docs for payment API", "gap": "docs", "impact": 3, "effort": 2, "confidence": 0.9},
                    {"text": "Implement Apple Pay", "gap": "wallets", "impact": 7, "effort": 5, "confidence": 0.8},
                    {"text": "Run pricing experiment", "gap": "pricing", "impact": 6, "effort": 3, "confidence": 0.6}
                ]})),
            )
            .await;
        let (generator, audit) = generator(provider.clone(), 3);
        let existing = vec![Task::manual("t1", "Implement Apple Pay")];
        let directives = vec![exclude_docs()];
        let cov = coverage(&["checkout"]);

        let outcome = generator
            .generate_drafts(DraftContext {
                outcome: "Increase payment conversion by 20%",
                reflections: &[],
                half_life_hours: 168.0,
                directives: &directives,
                coverage: &cov,
                existing: &existing,
                document_id: None,
            })
            .await;

        assert!(!outcome.degraded);
        let kept: Vec<&str> = outcome.kept.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(kept, vec!["Add one-click checkout"]);
        assert_eq!(outcome.kept[0].status, DraftStatus::Kept);
        assert!(outcome.kept[0].strategic_estimate.is_some());
        assert_eq!(outcome.suppressed.len(), 2);
        assert!(matches!(
            outcome.suppressed[0].reason,
            SuppressionReason::ExcludedTopic { .. }
        ));
        assert!(matches!(
            &outcome.suppressed[1].reason,
            SuppressionReason::Duplicate { matched_task_id, via_fingerprint: true, .. } if matched_task_id == "t1"
        ));
        assert_eq!(audit.entries(Some(AuditKind::Drafts)).await.len(), 1);

        let prompt = &provider.prompts_for(DRAFT_SCHEMA).await[0];
        assert!(prompt.user.contains("Avoid these topics entirely: documentation"));
        assert!(prompt.user.contains("- Implement Apple Pay"));
        assert!(prompt.system.contains("at most 3"));
    }

    #[tokio::test]
    async fn test_prompt_lists_reflections_newest_first_with_weights() {
        let provider = Arc::new(MockInferenceProvider::new());
        let (generator, _) = generator(provider.clone(), 3);
        let now = Utc::now();
        let notes = vec![
            Reflection::new("prioritize mobile checkout").with_created_at(now - Duration::hours(168)),
            Reflection::new("focus on wallets").with_created_at(now),
            Reflection::new("ignore hiring").with_created_at(now - Duration::hours(336)),
        ];
        let recent = active_most_recent_first(&notes, 5);
        let cov = coverage(&["checkout"]);

        generator
            .generate_drafts(DraftContext {
                outcome: "Increase payment conversion by 20%",
                reflections: &recent,
                half_life_hours: 168.0,
                directives: &[],
                coverage: &cov,
                existing: &[],
                document_id: None,
            })
            .await;

        let prompt = &provider.prompts_for(DRAFT_SCHEMA).await[0];
        let lines: Vec<&str> = prompt
            .user
            .lines()
            .filter(|l| l.starts_with("- (weight"))
            .collect();
        assert_eq!(
            lines,
            vec![
                "- (weight 1.00) focus on wallets",
                "- (weight 0.50) prioritize mobile checkout",
                "- (weight 0.25) ignore hiring",
            ]
        );
    }

    #[tokio::test]
    async fn test_fallback_drafts_one_per_missing_facet() {
        let provider = Arc::new(MockInferenceProvider::new());
        let (generator, _) = generator(provider, 5);
        let cov = coverage(&["increase", "conversion"]);

        let outcome = generator
            .generate_drafts(DraftContext {
                outcome: "Increase payment conversion",
                reflections: &[],
                half_life_hours: 168.0,
                directives: &[],
                coverage: &cov,
                existing: &[],
                document_id: Some("doc-1"),
            })
            .await;

        assert!(outcome.degraded);
        assert_eq!(outcome.kept.len(), 2);
        assert_eq!(outcome.kept[0].text, "Define and deliver increase");
        assert!(outcome.kept.iter().all(|d| d.degraded));
        assert_eq!(outcome.kept[1].document_id.as_deref(), Some("doc-1"));
    }
}
