//! Coverage estimation result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One facet of the outcome and the tasks that address it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageFacet {
    pub name: String,
    pub covered: bool,
    #[serde(default)]
    pub covering_task_ids: Vec<String>,
}

/// Estimated share of the outcome addressed by the considered tasks.
///
/// Ephemeral: recomputed on qualifying edits and only ever persisted as an
/// audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageResult {
    /// 0-100
    pub percentage: u8,
    pub task_count_considered: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub facets: Vec<CoverageFacet>,
    #[serde(default)]
    pub missing_facets: Vec<String>,
    /// Fewer tasks than the configured minimum were available
    #[serde(default)]
    pub low_confidence: bool,
    /// Only a top-N subset of tasks was considered
    #[serde(default)]
    pub partial: bool,
    /// Produced by the keyword-overlap fallback
    #[serde(default)]
    pub degraded: bool,
}

impl CoverageResult {
    /// A gap exists when coverage is under the threshold or facets are missing.
    pub fn has_gap(&self, gap_threshold: u8) -> bool {
        self.percentage < gap_threshold || !self.missing_facets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(percentage: u8, missing: &[&str]) -> CoverageResult {
        CoverageResult {
            percentage,
            task_count_considered: 3,
            timestamp: Utc::now(),
            facets: vec![],
            missing_facets: missing.iter().map(|s| s.to_string()).collect(),
            low_confidence: false,
            partial: false,
            degraded: false,
        }
    }

    #[test]
    fn test_has_gap() {
        assert!(result(40, &[]).has_gap(80));
        assert!(result(95, &["refunds"]).has_gap(80));
        assert!(!result(80, &[]).has_gap(80));
    }
}
