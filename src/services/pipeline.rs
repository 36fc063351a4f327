//! One recalculation pass.
//!
//! Reflections are interpreted and applied first, then coverage and quality
//! run concurrently over the active tasks. Drafts are generated only when
//! coverage reports a gap. The sorting engine orders whatever is left.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::reflection::active_most_recent_first;
use crate::domain::models::{
    Config, CoverageResult, DraftTask, Exclusion, Reflection, ReflectionConfig,
    ReflectionDirective, SortStrategy, Task,
};
use crate::services::audit_log::AuditLog;
use crate::services::coverage_analyzer::CoverageAnalyzer;
use crate::services::deduplication::{DedupThresholds, DeduplicationService};
use crate::services::draft_generator::{DraftContext, DraftGenerator, GenerationOutcome};
use crate::services::inference_client::InferenceClient;
use crate::services::quality_evaluator::QualityEvaluator;
use crate::services::reflection_interpreter::{apply_directives, ReflectionInterpreter};
use crate::services::similarity::SimilarityEngine;
use crate::services::sorting_engine::SortingEngine;

/// Inputs to one pass.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    pub outcome: &'a str,
    pub tasks: &'a [Task],
    pub reflections: &'a [Reflection],
    /// Drafts already shown; new drafts are deduplicated against them too
    pub pending_drafts: &'a [DraftTask],
    pub strategy: SortStrategy,
    pub document_id: Option<&'a str>,
}

/// Everything one pass produced.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// All input tasks in input order; active ones carry fresh scores
    pub tasks: Vec<Task>,
    pub ordered_ids: Vec<String>,
    pub exclusions: Vec<Exclusion>,
    pub boosts: HashMap<String, f64>,
    pub directives: Vec<ReflectionDirective>,
    pub coverage: CoverageResult,
    pub drafts: GenerationOutcome,
    pub degraded: bool,
}

pub struct AnalysisPipeline {
    interpreter: ReflectionInterpreter,
    coverage: CoverageAnalyzer,
    quality: QualityEvaluator,
    drafts: DraftGenerator,
    sorting: SortingEngine,
    reflections: ReflectionConfig,
    gap_threshold: u8,
}

impl AnalysisPipeline {
    pub fn from_config(config: &Config, client: Arc<InferenceClient>, audit: Arc<AuditLog>) -> Self {
        let engine = Arc::new(SimilarityEngine::new(client.clone()));
        let dedup = Arc::new(DeduplicationService::new(
            engine,
            DedupThresholds::from(&config.dedup),
            audit.clone(),
        ));

        Self {
            interpreter: ReflectionInterpreter::new(client.clone(), config.reflections.clone()),
            coverage: CoverageAnalyzer::new(client.clone(), config.coverage.clone(), audit.clone()),
            quality: QualityEvaluator::new(client.clone(), config.quality.clone(), audit.clone()),
            drafts: DraftGenerator::new(client, dedup, config.drafts.clone(), audit),
            sorting: SortingEngine::from_config(&config.sorting),
            reflections: config.reflections.clone(),
            gap_threshold: config.coverage.gap_threshold,
        }
    }

    pub fn sorting(&self) -> &SortingEngine {
        &self.sorting
    }

    /// Reject malformed input before any inference call is made.
    pub fn validate_input(input: &AnalysisInput<'_>) -> DomainResult<()> {
        if input.outcome.trim().is_empty() {
            return Err(DomainError::ValidationFailed("outcome must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for task in input.tasks {
            if task.id.trim().is_empty() {
                return Err(DomainError::ValidationFailed("task id must not be empty".to_string()));
            }
            if task.text.trim().is_empty() {
                return Err(DomainError::ValidationFailed(format!(
                    "task {} has empty text",
                    task.id
                )));
            }
            if !seen.insert(task.id.as_str()) {
                return Err(DomainError::ValidationFailed(format!(
                    "duplicate task id: {}",
                    task.id
                )));
            }
        }
        Ok(())
    }

    /// Run one full pass.
    #[instrument(skip(self, input), fields(task_count = input.tasks.len()))]
    pub async fn run(&self, input: AnalysisInput<'_>) -> DomainResult<AnalysisResult> {
        Self::validate_input(&input)?;
        let started = Instant::now();

        let interpreted = self.interpreter.interpret(input.reflections).await;
        let directives = interpreted.value;
        let applied = apply_directives(input.tasks, &directives, self.reflections.inclusion_boost);
        let active = applied.active;

        let (coverage, quality) = tokio::join!(
            self.coverage.analyze(input.outcome, &active),
            self.quality.score_tasks(active.clone(), input.outcome),
        );

        let mut candidates = input.tasks.to_vec();
        candidates.extend(input.pending_drafts.iter().map(DraftTask::as_candidate));

        let drafts = if coverage.has_gap(self.gap_threshold) {
            let recent = active_most_recent_first(input.reflections, self.reflections.max_reflections);
            self.drafts
                .generate_drafts(DraftContext {
                    outcome: input.outcome,
                    reflections: &recent,
                    half_life_hours: self.reflections.half_life_hours,
                    directives: &directives,
                    coverage: &coverage,
                    existing: &candidates,
                    document_id: input.document_id,
                })
                .await
        } else {
            GenerationOutcome::default()
        };

        let ordered_ids = self.sorting.sort(&quality.tasks, input.strategy, &applied.boosts);

        let scored: HashMap<&str, &Task> = quality.tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let tasks: Vec<Task> = input
            .tasks
            .iter()
            .map(|t| scored.get(t.id.as_str()).map_or_else(|| t.clone(), |s| (*s).clone()))
            .collect();

        let degraded = interpreted.degraded || coverage.degraded || quality.degraded || drafts.degraded;
        info!(
            active = active.len(),
            excluded = applied.exclusions.len(),
            coverage = coverage.percentage,
            drafts_kept = drafts.kept.len(),
            degraded,
            duration_ms = started.elapsed().as_millis() as u64,
            "Analysis pass complete"
        );

        Ok(AnalysisResult {
            tasks,
            ordered_ids,
            exclusions: applied.exclusions,
            boosts: applied.boosts,
            directives,
            coverage,
            drafts,
            degraded,
        })
    }
}
