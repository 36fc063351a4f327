//! Priority plans and sort strategies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::coverage::CoverageResult;

/// Named comparator used to order tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortStrategy {
    /// Descending combined priority
    #[default]
    Balanced,
    /// Ascending effort, then descending impact
    QuickWins,
    /// Descending impact, then descending confidence
    StrategicBets,
    /// Descending confidence, then descending priority
    HighConfidence,
    /// Descending quality score, unevaluated last
    QualityFirst,
}

impl SortStrategy {
    pub const ALL: [Self; 5] = [
        Self::Balanced,
        Self::QuickWins,
        Self::StrategicBets,
        Self::HighConfidence,
        Self::QualityFirst,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::QuickWins => "quick-wins",
            Self::StrategicBets => "strategic-bets",
            Self::HighConfidence => "high-confidence",
            Self::QualityFirst => "quality-first",
        }
    }
}

impl fmt::Display for SortStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == wanted)
            .ok_or_else(|| DomainError::UnknownStrategy(s.to_string()))
    }
}

/// A task removed from the active set by an exclusion directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub task_id: String,
    pub reflection_id: Uuid,
    pub topic: String,
    /// Human-readable reason citing the reflection
    pub reason: String,
}

/// Displayed ordering of task ids. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityPlan {
    /// Monotonically increasing per session
    pub version: u64,
    pub strategy: SortStrategy,
    pub ordered_ids: Vec<String>,
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
    #[serde(default)]
    pub coverage: Option<CoverageResult>,
    /// Some input came from a heuristic fallback
    #[serde(default)]
    pub degraded: bool,
    pub generated_at: DateTime<Utc>,
}

impl PriorityPlan {
    pub fn position_of(&self, task_id: &str) -> Option<usize> {
        self.ordered_ids.iter().position(|id| id == task_id)
    }

    pub fn exclusion_for(&self, task_id: &str) -> Option<&Exclusion> {
        self.exclusions.iter().find(|e| e.task_id == task_id)
    }
}

/// Why a recalculation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalcTrigger {
    OutcomeEdited,
    TaskEdited,
    ReflectionEdited,
    DraftDecided,
    Manual,
    Retry,
}

impl RecalcTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutcomeEdited => "outcome_edited",
            Self::TaskEdited => "task_edited",
            Self::ReflectionEdited => "reflection_edited",
            Self::DraftDecided => "draft_decided",
            Self::Manual => "manual",
            Self::Retry => "retry",
        }
    }
}

/// Final status of one recalculation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalcStatus {
    /// A new plan was published
    Applied,
    /// Inputs changed while running; result discarded
    Stale,
}

/// What `recalculate` reports back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalcOutcome {
    /// Latest published plan version after this request
    pub plan_version: u64,
    pub status: RecalcStatus,
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("balanced".parse::<SortStrategy>().unwrap(), SortStrategy::Balanced);
        assert_eq!("Quick_Wins".parse::<SortStrategy>().unwrap(), SortStrategy::QuickWins);
        assert!(matches!(
            "fastest".parse::<SortStrategy>(),
            Err(DomainError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_strategy_names_match_serde() {
        for strategy in SortStrategy::ALL {
            let json = serde_json::to_string(&strategy).unwrap();
            assert_eq!(json, format!("\"{}\"", strategy.as_str()));
        }
    }

    #[test]
    fn test_plan_lookup_helpers() {
        let plan = PriorityPlan {
            version: 1,
            strategy: SortStrategy::Balanced,
            ordered_ids: vec!["b".to_string(), "a".to_string()],
            exclusions: vec![],
            coverage: None,
            degraded: false,
            generated_at: Utc::now(),
        };
        assert_eq!(plan.position_of("a"), Some(1));
        assert_eq!(plan.position_of("z"), None);
        assert!(plan.exclusion_for("a").is_none());
    }
}
