//! Strategy-based ordering of scored tasks.
//!
//! Sorting is pure and needs no inference, so a strategy change re-sorts the
//! last scores directly. Every strategy breaks ties on task id, which keeps
//! the order stable between runs.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::domain::models::{SortStrategy, SortingConfig, Task};

/// Quality assumed for tasks not yet evaluated when blending scores
const UNEVALUATED_QUALITY: f64 = 50.0;

/// Service for ordering tasks under a named strategy
///
/// Balanced score: priority_weight * strategic priority + quality_weight * quality + boost
///
/// Pure: it only reads scores already on the tasks. Every comparator ends
/// with the task id so equal scores always come out in the same order.
#[derive(Debug, Clone)]
pub struct SortingEngine {
    priority_weight: f64,
    quality_weight: f64,
}

impl Default for SortingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SortingEngine {
    /// Create a sorting engine with default weights
    pub fn new() -> Self {
        Self {
            priority_weight: 0.6,
            quality_weight: 0.4,
        }
    }

    /// Create a sorting engine with custom weights
    pub fn with_weights(priority_weight: f64, quality_weight: f64) -> Self {
        Self {
            priority_weight,
            quality_weight,
        }
    }

    pub fn from_config(config: &SortingConfig) -> Self {
        Self::with_weights(config.priority_weight, config.quality_weight)
    }

    /// Combined priority used by the balanced strategy
    ///
    /// # Arguments
    /// * `task` - The task to score
    /// * `boost` - Additive boost from focus directives (0 when none)
    pub fn combined_score(&self, task: &Task, boost: f64) -> f64 {
        let priority = task.strategic_or_neutral().priority;
        let quality = task
            .quality_score
            .map_or(UNEVALUATED_QUALITY, f64::from);
        self.priority_weight * priority + self.quality_weight * quality + boost
    }

    /// Order task ids under `strategy`
    ///
    /// `boosts` maps task ids to inclusion boosts; missing ids get none.
    pub fn sort(&self, tasks: &[Task], strategy: SortStrategy, boosts: &HashMap<String, f64>) -> Vec<String> {
        let mut keyed: Vec<(&Task, f64)> = tasks
            .iter()
            .map(|t| {
                let boost = boosts.get(&t.id).copied().unwrap_or(0.0);
                (t, self.combined_score(t, boost))
            })
            .collect();

        keyed.sort_by(|(a, a_score), (b, b_score)| {
            compare(strategy, a, *a_score, b, *b_score).then_with(|| a.id.cmp(&b.id))
        });

        keyed.into_iter().map(|(t, _)| t.id.clone()).collect()
    }
}

fn compare(strategy: SortStrategy, a: &Task, a_score: f64, b: &Task, b_score: f64) -> Ordering {
    let sa = a.strategic_or_neutral();
    let sb = b.strategic_or_neutral();
    match strategy {
        SortStrategy::Balanced => b_score.total_cmp(&a_score),
        SortStrategy::QuickWins => sa
            .effort
            .total_cmp(&sb.effort)
            .then_with(|| sb.impact.total_cmp(&sa.impact)),
        SortStrategy::StrategicBets => sb
            .impact
            .total_cmp(&sa.impact)
            .then_with(|| sb.confidence.total_cmp(&sa.confidence)),
        SortStrategy::HighConfidence => sb
            .confidence
            .total_cmp(&sa.confidence)
            .then_with(|| sb.priority.total_cmp(&sa.priority)),
        // Some sorts after None, so reverse to put unevaluated tasks last
        SortStrategy::QualityFirst => b.quality_score.cmp(&a.quality_score),
    }
}
