//! Rubric-based quality scoring.
//!
//! Tasks are scored for clarity, specificity, actionability and alignment
//! with the outcome, then mapped onto a tier. Batches are split into chunks,
//! each one a single completion; chunks run with bounded parallelism. Any
//! item the provider does not score is scored by text heuristics instead,
//! so one bad item never fails the batch.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::domain::models::{
    AuditEntry, AuditKind, AuditRecord, QualityConfig, QualityTier, StrategicScore, Task,
};
use crate::domain::ports::{Prompt, ResponseSchema};
use crate::domain::text;
use crate::services::audit_log::AuditLog;
use crate::services::inference_client::InferenceClient;

pub const QUALITY_SCHEMA: &str = "quality_rubric";

const ACTION_VERBS: &[&str] = &[
    "add", "analyze", "audit", "automate", "build", "create", "define", "deliver", "deploy",
    "design", "document", "draft", "enable", "establish", "evaluate", "fix", "hire", "implement",
    "improve", "integrate", "interview", "launch", "measure", "migrate", "optimize", "plan",
    "publish", "reduce", "refactor", "remove", "replace", "research", "review", "run", "set",
    "ship", "test", "track", "update", "validate", "write",
];

const MEASURABLE_TERMS: &[&str] = &[
    "percent", "per", "by", "within", "deadline", "metric", "kpi", "rate", "target",
    "baseline", "week", "month", "quarter", "day", "users", "customers",
];

/// Per-rubric scores, each 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RubricScores {
    pub clarity: f64,
    pub specificity: f64,
    pub actionability: f64,
    pub alignment: f64,
}

impl RubricScores {
    /// Weighted mean, falling back to the plain mean when all weights are zero.
    pub fn combined(&self, config: &QualityConfig) -> u8 {
        let pairs = [
            (self.clarity, config.clarity_weight),
            (self.specificity, config.specificity_weight),
            (self.actionability, config.actionability_weight),
            (self.alignment, config.alignment_weight),
        ];
        let total_weight: f64 = pairs.iter().map(|(_, w)| w.max(0.0)).sum();
        let score = if total_weight > 0.0 {
            pairs.iter().map(|(s, w)| s * w.max(0.0)).sum::<f64>() / total_weight
        } else {
            pairs.iter().map(|(s, _)| s).sum::<f64>() / pairs.len() as f64
        };
        if score.is_finite() {
            score.round().clamp(0.0, 100.0) as u8
        } else {
            0
        }
    }
}

/// Quality verdict for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub task_id: String,
    pub score: u8,
    pub tier: QualityTier,
    pub rubric: RubricScores,
    pub strategic: StrategicScore,
    /// Scored by heuristics rather than the provider
    pub degraded: bool,
}

/// Tasks with quality and strategic scores filled in.
#[derive(Debug, Clone, Default)]
pub struct QualityPass {
    pub tasks: Vec<Task>,
    pub assessments: Vec<QualityAssessment>,
    pub degraded: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RubricList {
    evaluations: Vec<RawEvaluation>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEvaluation {
    task_id: String,
    clarity: f64,
    specificity: f64,
    actionability: f64,
    alignment: f64,
    impact: f64,
    effort: f64,
    confidence: f64,
}

pub fn quality_schema() -> ResponseSchema {
    let rubric = json!({"type": "number", "minimum": 0, "maximum": 100});
    ResponseSchema::new(
        QUALITY_SCHEMA,
        vec!["evaluations"],
        json!({
            "type": "object",
            "properties": {
                "evaluations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "task_id": {"type": "string"},
                            "clarity": rubric,
                            "specificity": rubric,
                            "actionability": rubric,
                            "alignment": rubric,
                            "impact": {"type": "number", "minimum": 0, "maximum": 10},
                            "effort": {"type": "number", "minimum": 0, "maximum": 10},
                            "confidence": {"type": "number", "minimum": 0, "maximum": 1}
                        },
                        "required": ["task_id", "clarity", "specificity", "actionability",
                                     "alignment", "impact", "effort", "confidence"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["evaluations"],
            "additionalProperties": false
        }),
    )
}

pub struct QualityEvaluator {
    client: Arc<InferenceClient>,
    config: QualityConfig,
    audit: Arc<AuditLog>,
}

impl QualityEvaluator {
    pub fn new(client: Arc<InferenceClient>, config: QualityConfig, audit: Arc<AuditLog>) -> Self {
        Self {
            client,
            config,
            audit,
        }
    }

    /// Score a single task.
    pub async fn evaluate(&self, task: &Task, outcome: &str) -> QualityAssessment {
        let mut scored = self.evaluate_chunk(vec![task], outcome).await;
        scored
            .pop()
            .unwrap_or_else(|| self.heuristic_assessment(task, outcome))
    }

    /// Score every task, in input order.
    pub async fn evaluate_batch(&self, tasks: &[Task], outcome: &str) -> Vec<QualityAssessment> {
        let chunk_size = self.config.chunk_size.max(1);
        let parallel = self.config.parallel_chunks.max(1);

        // Futures built up front keep the buffered stream Send
        let chunks: Vec<_> = tasks
            .chunks(chunk_size)
            .map(|chunk| self.evaluate_chunk(chunk.iter().collect(), outcome))
            .collect();

        stream::iter(chunks)
            .buffered(parallel)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Score `tasks` and write the results onto them.
    ///
    /// Strategic estimates only fill tasks that have none.
    pub async fn score_tasks(&self, tasks: Vec<Task>, outcome: &str) -> QualityPass {
        let started = Instant::now();
        let assessments = self.evaluate_batch(&tasks, outcome).await;
        let by_id: HashMap<&str, &QualityAssessment> =
            assessments.iter().map(|a| (a.task_id.as_str(), a)).collect();

        let tasks: Vec<Task> = tasks
            .into_iter()
            .map(|mut task| {
                if let Some(assessment) = by_id.get(task.id.as_str()) {
                    task = task.with_quality(assessment.score, assessment.tier);
                    if task.strategic_score.is_none() {
                        task.strategic_score = Some(assessment.strategic);
                    }
                }
                task
            })
            .collect();

        let degraded_count = assessments.iter().filter(|a| a.degraded).count();
        let degraded = degraded_count > 0;
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            task_count = tasks.len(),
            degraded_count,
            duration_ms,
            "Quality evaluated"
        );
        self.audit
            .record(AuditEntry::Pass(AuditRecord::new(
                AuditKind::Quality,
                duration_ms,
                tasks.len(),
                degraded,
            )))
            .await;

        QualityPass {
            tasks,
            assessments,
            degraded,
        }
    }

    async fn evaluate_chunk(&self, chunk: Vec<&Task>, outcome: &str) -> Vec<QualityAssessment> {
        if chunk.is_empty() {
            return Vec::new();
        }

        let prompt = build_prompt(&chunk, outcome);
        let call = self
            .client
            .complete_or_else("quality", &prompt, &quality_schema(), |_| RubricList {
                evaluations: Vec::new(),
            })
            .await;

        let mut scored: HashMap<String, RawEvaluation> = call
            .value
            .evaluations
            .into_iter()
            .map(|e| (e.task_id.clone(), e))
            .collect();

        chunk
            .into_iter()
            .map(|task| match scored.remove(&task.id) {
                Some(raw) => self.rubric_assessment(task, &raw),
                None => {
                    debug!(task_id = %task.id, "No rubric for task, scoring heuristically");
                    self.heuristic_assessment(task, outcome)
                }
            })
            .collect()
    }

    fn rubric_assessment(&self, task: &Task, raw: &RawEvaluation) -> QualityAssessment {
        let rubric = RubricScores {
            clarity: clamp_rubric(raw.clarity),
            specificity: clamp_rubric(raw.specificity),
            actionability: clamp_rubric(raw.actionability),
            alignment: clamp_rubric(raw.alignment),
        };
        self.assessment(
            task,
            rubric,
            StrategicScore::new(raw.impact, raw.effort, raw.confidence),
            false,
        )
    }

    fn heuristic_assessment(&self, task: &Task, outcome: &str) -> QualityAssessment {
        self.assessment(
            task,
            heuristic_rubric(&task.text, outcome),
            StrategicScore::neutral(),
            true,
        )
    }

    fn assessment(
        &self,
        task: &Task,
        rubric: RubricScores,
        strategic: StrategicScore,
        degraded: bool,
    ) -> QualityAssessment {
        let score = rubric.combined(&self.config);
        QualityAssessment {
            task_id: task.id.clone(),
            score,
            tier: QualityTier::from_score(score, self.config.excellent_cutoff, self.config.good_cutoff),
            rubric,
            strategic,
            degraded,
        }
    }
}

fn clamp_rubric(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn build_prompt(tasks: &[&Task], outcome: &str) -> Prompt {
    let listing = tasks
        .iter()
        .map(|t| format!("- id={}: {}", t.id, t.text))
        .collect::<Vec<_>>()
        .join("\n");
    Prompt::new(
        "You grade tasks against an outcome. For every task score clarity, specificity, \
         actionability and alignment with the outcome from 0 to 100, and estimate impact \
         (0-10), effort (0-10, higher is more work) and confidence (0-1). Return one \
         evaluation per task id.",
        format!("Outcome: {outcome}\n\nTasks:\n{listing}"),
    )
}

/// Text-feature rubric used when the provider gives no score.
pub fn heuristic_rubric(task_text: &str, outcome: &str) -> RubricScores {
    let words: Vec<String> = text::tokens(task_text);
    let count = words.len();

    let clarity = match count {
        0 => 0.0,
        1..=3 => 30.0 + 12.0 * count as f64,
        4..=20 => 85.0,
        _ => (85.0 - 3.0 * (count - 20) as f64).max(40.0),
    };

    let actionability = match words.first() {
        Some(first) if ACTION_VERBS.contains(&first.as_str()) => 85.0,
        Some(_) => 45.0,
        None => 0.0,
    };

    let has_number = task_text.chars().any(|c| c.is_ascii_digit());
    let has_measure = task_text.contains('%')
        || MEASURABLE_TERMS
            .iter()
            .any(|term| words.iter().any(|w| w == term));
    let specificity = match (has_number, has_measure) {
        (true, true) => 90.0,
        (true, false) | (false, true) => 70.0,
        (false, false) => 45.0,
    };

    let outcome_keywords = text::keywords(outcome);
    let alignment = if outcome_keywords.is_empty() {
        50.0
    } else {
        let task_keywords = text::keywords(task_text);
        let matched = outcome_keywords
            .iter()
            .filter(|k| task_keywords.iter().any(|w| text::stems_match(w, k)))
            .count();
        30.0 + 70.0 * matched as f64 / outcome_keywords.len() as f64
    };

    RubricScores {
        clarity,
        specificity,
        actionability,
        alignment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::inference::{MockInferenceProvider, MockReply};
    use crate::services::retry_controller::{RetryController, RetryPolicy};

    fn evaluator(provider: Arc<MockInferenceProvider>, chunk_size: usize) -> (QualityEvaluator, Arc<AuditLog>) {
        let retry = Arc::new(RetryController::new(RetryPolicy::default(), 4));
        let audit = Arc::new(AuditLog::in_memory());
        let config = QualityConfig {
            chunk_size,
            ..QualityConfig::default()
        };
        (
            QualityEvaluator::new(Arc::new(InferenceClient::new(provider, retry)), config, audit.clone()),
            audit,
        )
    }

    fn rubric(task_id: &str, all: f64) -> serde_json::Value {
        json!({"task_id": task_id, "clarity": all, "specificity": all, "actionability": all,
               "alignment": all, "impact": 8, "effort": 2, "confidence": 0.9})
    }

    #[test]
    fn test_tier_boundaries_are_inclusive() {
        let config = QualityConfig::default();
        let tier = |s| QualityTier::from_score(s, config.excellent_cutoff, config.good_cutoff);
        assert_eq!(tier(80), QualityTier::Excellent);
        assert_eq!(tier(79), QualityTier::Good);
        assert_eq!(tier(50), QualityTier::Good);
        assert_eq!(tier(49), QualityTier::NeedsWork);
    }

    #[test]
    fn test_weighted_combination() {
        let scores = RubricScores {
            clarity: 100.0,
            specificity: 0.0,
            actionability: 0.0,
            alignment: 0.0,
        };
        let weighted = QualityConfig {
            clarity_weight: 3.0,
            ..QualityConfig::default()
        };
        assert_eq!(scores.combined(&QualityConfig::default()), 25);
        assert_eq!(scores.combined(&weighted), 50);
    }

    #[test]
    fn test_heuristic_prefers_specific_actionable_text() {
        let outcome = "Increase payment conversion by 20%";
        let vague = heuristic_rubric("payments", outcome);
        let sharp = heuristic_rubric("Implement Apple Pay to lift payment conversion by 5% this quarter", outcome);
        let config = QualityConfig::default();
        assert!(sharp.combined(&config) > vague.combined(&config));
        assert_eq!(sharp.actionability, 85.0);
        assert_eq!(sharp.specificity, 90.0);
    }

    #[tokio::test]
    async fn test_missing_item_degrades_only_that_item() {
        let provider = Arc::new(MockInferenceProvider::new());
        provider
            .push_reply(QUALITY_SCHEMA, MockReply::Respond(json!({"evaluations": [rubric("a", 90.0)]})))
            .await;
        let (evaluator, audit) = evaluator(provider, 4);
        let tasks = vec![
            Task::manual("a", "Implement Apple Pay"),
            Task::manual("b", "Update API docs"),
        ];

        let pass = evaluator.score_tasks(tasks, "Increase payment conversion").await;

        assert!(pass.degraded);
        assert_eq!(pass.tasks[0].quality_score, Some(90));
        assert_eq!(pass.tasks[0].quality_tier, Some(QualityTier::Excellent));
        assert!((pass.tasks[0].strategic_or_neutral().priority - 36.0).abs() < 1e-9);
        assert!(!pass.assessments[0].degraded);
        assert!(pass.assessments[1].degraded);
        assert!(pass.tasks[1].quality_score.is_some());
        assert_eq!(audit.entries(Some(AuditKind::Quality)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_chunks_preserve_input_order() {
        let provider = Arc::new(MockInferenceProvider::new());
        provider
            .set_standing_reply(
                QUALITY_SCHEMA,
                MockReply::Respond(json!({"evaluations": [
                    rubric("t3", 20.0), rubric("t2", 60.0), rubric("t1", 70.0)
                ]})),
            )
            .await;
        let (evaluator, _) = evaluator(provider.clone(), 2);
        let tasks = vec![
            Task::manual("t1", "one"),
            Task::manual("t2", "two"),
            Task::manual("t3", "three"),
        ];

        let scored = evaluator.evaluate_batch(&tasks, "goal").await;
        let ids: Vec<&str> = scored.iter().map(|a| a.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
        assert_eq!(provider.complete_calls(), 2);
        assert!(scored.iter().all(|a| !a.degraded));
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_batch_future_is_send() {
        let provider = Arc::new(MockInferenceProvider::new());
        let (evaluator, _) = evaluator(provider, 1);
        let tasks = vec![Task::manual("a", "one"), Task::manual("b", "two")];

        let batch = evaluator.evaluate_batch(&tasks, "goal");
        assert_send(&batch);
        assert_eq!(batch.await.len(), 2);

        let pass = evaluator.score_tasks(tasks, "goal");
        assert_send(&pass);
        assert_eq!(pass.await.tasks.len(), 2);
    }

    #[tokio::test]
    async fn test_existing_strategic_score_is_kept() {
        let provider = Arc::new(MockInferenceProvider::new());
        provider
            .push_reply(QUALITY_SCHEMA, MockReply::Respond(json!({"evaluations": [rubric("a", 55.0)]})))
            .await;
        let (evaluator, _) = evaluator(provider, 4);
        let own = StrategicScore::new(2.0, 8.0, 0.3);

        let pass = evaluator
            .score_tasks(vec![Task::manual("a", "Tidy backlog").with_strategic(own)], "goal")
            .await;
        assert_eq!(pass.tasks[0].strategic_score, Some(own));
        assert_eq!(pass.tasks[0].quality_tier, Some(QualityTier::Good));
    }
}
