//! Task domain model.
//!
//! Tasks are the candidate units of work measured against an outcome.
//! Identity fields (`id`, `text`, `source`, `document_id`, hash) belong to the
//! caller; quality and strategic scores are filled in by the evaluators.

use serde::{Deserialize, Serialize};

use crate::domain::text;

/// Where a task came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    /// Written by the user
    #[default]
    Manual,
    /// Promoted from an accepted draft
    Generated,
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Generated => "generated",
        }
    }
}

/// Categorical quality badge derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityTier {
    NeedsWork,
    Good,
    Excellent,
}

impl QualityTier {
    /// Map a 0-100 score onto a tier. Both cutoffs are inclusive lower bounds.
    pub fn from_score(score: u8, excellent_cutoff: u8, good_cutoff: u8) -> Self {
        if score >= excellent_cutoff {
            Self::Excellent
        } else if score >= good_cutoff {
            Self::Good
        } else {
            Self::NeedsWork
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeedsWork => "needs-work",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "needs-work" | "needs_work" => Some(Self::NeedsWork),
            "good" => Some(Self::Good),
            "excellent" => Some(Self::Excellent),
            _ => None,
        }
    }
}

/// Display view of a task's tier. Never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityBadge {
    pub tier: QualityTier,
    pub label: &'static str,
}

impl From<QualityTier> for QualityBadge {
    fn from(tier: QualityTier) -> Self {
        let label = match tier {
            QualityTier::NeedsWork => "Needs work",
            QualityTier::Good => "Good",
            QualityTier::Excellent => "Excellent",
        };
        Self { tier, label }
    }
}

/// Impact/effort/confidence estimate and the priority derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategicScore {
    /// 0-10, higher is more valuable
    pub impact: f64,
    /// 0-10, higher is more work
    pub effort: f64,
    /// 0.0-1.0
    pub confidence: f64,
    /// 0-100, derived
    pub priority: f64,
}

impl StrategicScore {
    /// Build a score, clamping inputs and deriving `priority`.
    ///
    /// priority = impact * confidence / max(effort, 1), rescaled so that the
    /// best case (impact 10, confidence 1, effort 1) is 100.
    pub fn new(impact: f64, effort: f64, confidence: f64) -> Self {
        let impact = clamp_finite(impact, 0.0, 10.0, 5.0);
        let effort = clamp_finite(effort, 0.0, 10.0, 5.0);
        let confidence = clamp_finite(confidence, 0.0, 1.0, 0.5);
        let priority = (impact * confidence / effort.max(1.0)) * 10.0;
        Self {
            impact,
            effort,
            confidence,
            priority: priority.clamp(0.0, 100.0),
        }
    }

    /// Used when nothing better is known.
    pub fn neutral() -> Self {
        Self::new(5.0, 5.0, 0.5)
    }
}

fn clamp_finite(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// A candidate unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Caller-supplied stable id, unique within a session
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub source: TaskSource,
    #[serde(default)]
    pub quality_score: Option<u8>,
    #[serde(default)]
    pub quality_tier: Option<QualityTier>,
    #[serde(default)]
    pub strategic_score: Option<StrategicScore>,
    #[serde(default = "default_true")]
    pub is_manual: bool,
    /// Provenance scope used to bound deduplication
    #[serde(default)]
    pub document_id: Option<String>,
    /// Fingerprint of the normalized text
    #[serde(default)]
    pub deduplication_hash: String,
}

const fn default_true() -> bool {
    true
}

impl Task {
    /// Create a user-authored task.
    pub fn manual(id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            deduplication_hash: text::fingerprint(&text),
            text,
            source: TaskSource::Manual,
            quality_score: None,
            quality_tier: None,
            strategic_score: None,
            is_manual: true,
            document_id: None,
        }
    }

    /// Create a task promoted from a generated draft.
    pub fn generated(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: TaskSource::Generated,
            is_manual: false,
            ..Self::manual(id, text)
        }
    }

    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn with_strategic(mut self, score: StrategicScore) -> Self {
        self.strategic_score = Some(score);
        self
    }

    pub fn with_quality(mut self, score: u8, tier: QualityTier) -> Self {
        self.quality_score = Some(score.min(100));
        self.quality_tier = Some(tier);
        self
    }

    /// Replace the text and recompute the fingerprint. Scores go stale with it.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.deduplication_hash = text::fingerprint(&self.text);
        self.quality_score = None;
        self.quality_tier = None;
    }

    /// Recompute the hash if the caller deserialized a task without one.
    pub fn ensure_hash(&mut self) {
        if self.deduplication_hash.is_empty() {
            self.deduplication_hash = text::fingerprint(&self.text);
        }
    }

    /// Strategic score, or the neutral estimate when none exists yet.
    pub fn strategic_or_neutral(&self) -> StrategicScore {
        self.strategic_score.unwrap_or_else(StrategicScore::neutral)
    }

    pub fn quality_badge(&self) -> Option<QualityBadge> {
        self.quality_tier.map(QualityBadge::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries_are_inclusive() {
        assert_eq!(QualityTier::from_score(80, 80, 50), QualityTier::Excellent);
        assert_eq!(QualityTier::from_score(79, 80, 50), QualityTier::Good);
        assert_eq!(QualityTier::from_score(50, 80, 50), QualityTier::Good);
        assert_eq!(QualityTier::from_score(49, 80, 50), QualityTier::NeedsWork);
        assert_eq!(QualityTier::from_score(0, 80, 50), QualityTier::NeedsWork);
    }

    #[test]
    fn test_tier_round_trip_names() {
        for tier in [QualityTier::NeedsWork, QualityTier::Good, QualityTier::Excellent] {
            assert_eq!(QualityTier::from_str(tier.as_str()), Some(tier));
        }
        assert_eq!(
            serde_json::to_string(&QualityTier::NeedsWork).unwrap(),
            "\"needs-work\""
        );
    }

    #[test]
    fn test_strategic_priority_derivation() {
        let best = StrategicScore::new(10.0, 1.0, 1.0);
        assert!((best.priority - 100.0).abs() < f64::EPSILON);

        let neutral = StrategicScore::neutral();
        assert!((neutral.priority - 5.0).abs() < f64::EPSILON);

        let clamped = StrategicScore::new(42.0, -3.0, 7.0);
        assert!((clamped.impact - 10.0).abs() < f64::EPSILON);
        assert!((clamped.confidence - 1.0).abs() < f64::EPSILON);
        assert!((clamped.priority - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_non_finite_inputs_fall_back() {
        let score = StrategicScore::new(f64::NAN, f64::INFINITY, 0.5);
        assert!((score.impact - 5.0).abs() < f64::EPSILON);
        assert!((score.effort - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_set_text_rehashes_and_clears_quality() {
        let mut task = Task::manual("t1", "Update API docs").with_quality(90, QualityTier::Excellent);
        let before = task.deduplication_hash.clone();
        task.set_text("Implement Apple Pay");
        assert_ne!(task.deduplication_hash, before);
        assert!(task.quality_score.is_none());
        assert!(task.quality_badge().is_none());
    }

    #[test]
    fn test_generated_task_is_not_manual() {
        let task = Task::generated("d1", "Add checkout analytics");
        assert_eq!(task.source, TaskSource::Generated);
        assert!(!task.is_manual);
    }

    #[test]
    fn test_deserialize_minimal_task() {
        let mut task: Task = serde_json::from_str(r#"{"id":"t1","text":"Ship it"}"#).unwrap();
        assert!(task.is_manual);
        assert!(task.deduplication_hash.is_empty());
        task.ensure_hash();
        assert_eq!(task.deduplication_hash, text::fingerprint("ship it"));
    }
}
