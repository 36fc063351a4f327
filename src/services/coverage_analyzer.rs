//! Coverage analysis: how much of the outcome the task set addresses.
//!
//! One inference call per analysis estimates the percentage and a facet
//! breakdown. Small task sets are still analyzed but flagged
//! low-confidence; large ones are cut to the top-N by priority and flagged
//! partial. When inference is unavailable, a keyword-overlap heuristic
//! produces a degraded estimate instead.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::domain::models::{
    AuditEntry, AuditKind, AuditRecord, CoverageConfig, CoverageFacet, CoverageResult, Task,
};
use crate::domain::ports::{Prompt, ResponseSchema};
use crate::domain::text;
use crate::services::audit_log::AuditLog;
use crate::services::inference_client::InferenceClient;

pub const COVERAGE_SCHEMA: &str = "coverage_estimate";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CoverageEstimate {
    pub percentage: f64,
    #[serde(default)]
    pub facets: Vec<FacetEstimate>,
    #[serde(default)]
    pub missing_facets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FacetEstimate {
    pub name: String,
    pub covered: bool,
    #[serde(default)]
    pub covering_task_ids: Vec<String>,
}

pub fn coverage_schema() -> ResponseSchema {
    ResponseSchema::new(
        COVERAGE_SCHEMA,
        vec!["percentage", "facets"],
        json!({
            "type": "object",
            "properties": {
                "percentage": {"type": "number", "minimum": 0, "maximum": 100},
                "facets": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "covered": {"type": "boolean"},
                            "covering_task_ids": {"type": "array", "items": {"type": "string"}}
                        },
                        "required": ["name", "covered", "covering_task_ids"],
                        "additionalProperties": false
                    }
                },
                "missing_facets": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["percentage", "facets", "missing_facets"],
            "additionalProperties": false
        }),
    )
}

pub struct CoverageAnalyzer {
    client: Arc<InferenceClient>,
    config: CoverageConfig,
    audit: Arc<AuditLog>,
}

impl CoverageAnalyzer {
    pub fn new(client: Arc<InferenceClient>, config: CoverageConfig, audit: Arc<AuditLog>) -> Self {
        Self {
            client,
            config,
            audit,
        }
    }

    /// Estimate coverage of `outcome` by `tasks`. Never fails.
    pub async fn analyze(&self, outcome: &str, tasks: &[Task]) -> CoverageResult {
        let started = Instant::now();
        let (considered, partial) = select_subset(tasks, self.config.max_tasks);
        let low_confidence = considered.len() < self.config.min_tasks;

        let prompt = build_prompt(outcome, &considered);
        let call = self
            .client
            .complete_or_else("coverage", &prompt, &coverage_schema(), |_| {
                heuristic_estimate(outcome, &considered)
            })
            .await;

        let result = into_result(call.value, &considered, low_confidence, partial, call.degraded);
        let duration_ms = started.elapsed().as_millis() as u64;

        info!(
            percentage = result.percentage,
            task_count = result.task_count_considered,
            low_confidence,
            partial,
            degraded = result.degraded,
            duration_ms,
            "Coverage analyzed"
        );

        self.audit.record(AuditEntry::Coverage(result.clone())).await;
        self.audit
            .record(AuditEntry::Pass(AuditRecord::new(
                AuditKind::Coverage,
                duration_ms,
                result.task_count_considered,
                result.degraded,
            )))
            .await;

        result
    }
}

/// Top-N tasks by strategic priority (id tie-break) when over the cap.
fn select_subset(tasks: &[Task], max_tasks: usize) -> (Vec<&Task>, bool) {
    let mut selected: Vec<&Task> = tasks.iter().collect();
    if selected.len() <= max_tasks {
        return (selected, false);
    }
    selected.sort_by(|a, b| {
        b.strategic_or_neutral()
            .priority
            .total_cmp(&a.strategic_or_neutral().priority)
            .then_with(|| a.id.cmp(&b.id))
    });
    selected.truncate(max_tasks);
    debug!(kept = max_tasks, total = tasks.len(), "Coverage limited to top tasks");
    (selected, true)
}

fn build_prompt(outcome: &str, tasks: &[&Task]) -> Prompt {
    let listing = if tasks.is_empty() {
        "(no tasks yet)".to_string()
    } else {
        tasks
            .iter()
            .map(|t| format!("- [{}] {}", t.id, t.text))
            .collect::<Vec<_>>()
            .join("\n")
    };
    Prompt::new(
        "You assess how completely a set of tasks achieves a stated outcome. \
         Break the outcome into its essential facets, mark each facet covered or not, \
         cite the ids of covering tasks, and estimate overall coverage from 0 to 100.",
        format!("Outcome: {outcome}\n\nTasks:\n{listing}"),
    )
}

/// Keyword-overlap coverage: each outcome keyword is a facet.
pub fn heuristic_estimate(outcome: &str, tasks: &[&Task]) -> CoverageEstimate {
    let task_keywords: Vec<(&str, Vec<String>)> = tasks
        .iter()
        .map(|t| (t.id.as_str(), text::keywords(&t.text)))
        .collect();

    let facets: Vec<FacetEstimate> = text::keywords(outcome)
        .into_iter()
        .map(|facet| {
            let covering_task_ids: Vec<String> = task_keywords
                .iter()
                .filter(|(_, words)| words.iter().any(|w| text::stems_match(w, &facet)))
                .map(|(id, _)| (*id).to_string())
                .collect();
            FacetEstimate {
                covered: !covering_task_ids.is_empty(),
                name: facet,
                covering_task_ids,
            }
        })
        .collect();

    let covered = facets.iter().filter(|f| f.covered).count();
    let percentage = if facets.is_empty() {
        0.0
    } else {
        covered as f64 * 100.0 / facets.len() as f64
    };
    let missing_facets = facets
        .iter()
        .filter(|f| !f.covered)
        .map(|f| f.name.clone())
        .collect();

    CoverageEstimate {
        percentage,
        facets,
        missing_facets,
    }
}

fn into_result(
    estimate: CoverageEstimate,
    considered: &[&Task],
    low_confidence: bool,
    partial: bool,
    degraded: bool,
) -> CoverageResult {
    let known: HashSet<&str> = considered.iter().map(|t| t.id.as_str()).collect();
    let facets: Vec<CoverageFacet> = estimate
        .facets
        .into_iter()
        .map(|f| CoverageFacet {
            covering_task_ids: f
                .covering_task_ids
                .into_iter()
                .filter(|id| known.contains(id.as_str()))
                .collect(),
            name: f.name,
            covered: f.covered,
        })
        .collect();

    let mut missing_facets = estimate.missing_facets;
    for facet in facets.iter().filter(|f| !f.covered) {
        if !missing_facets.contains(&facet.name) {
            missing_facets.push(facet.name.clone());
        }
    }

    let percentage = if estimate.percentage.is_finite() {
        estimate.percentage.round().clamp(0.0, 100.0) as u8
    } else {
        0
    };

    CoverageResult {
        percentage,
        task_count_considered: considered.len(),
        timestamp: Utc::now(),
        facets,
        missing_facets,
        low_confidence,
        partial,
        degraded,
    }
}
