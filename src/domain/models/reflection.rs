//! Reflections: free-text steering notes attached to a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Weight never decays below this, so an old note still counts a little.
pub const MIN_RECENCY_WEIGHT: f64 = 0.05;

/// A user-authored steering note.
///
/// Reflections are never edited in place. Superseding one archives it and
/// links it to the replacement through `superseded_by`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub superseded_by: Option<Uuid>,
}

impl Reflection {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            created_at: Utc::now(),
            archived: false,
            superseded_by: None,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Exponential decay: 1.0 when fresh, halving every `half_life_hours`.
    pub fn recency_weight(&self, now: DateTime<Utc>, half_life_hours: f64) -> f64 {
        let age_hours = (now - self.created_at).num_seconds().max(0) as f64 / 3600.0;
        if half_life_hours <= 0.0 {
            return 1.0;
        }
        0.5_f64
            .powf(age_hours / half_life_hours)
            .max(MIN_RECENCY_WEIGHT)
    }

    /// Archive this reflection in favour of a new one carrying `text`.
    pub fn supersede(&mut self, text: impl Into<String>) -> Self {
        let next = Self::new(text);
        self.archived = true;
        self.superseded_by = Some(next.id);
        next
    }
}

/// Active reflections, most recent first, capped at `limit`.
pub fn active_most_recent_first(reflections: &[Reflection], limit: usize) -> Vec<&Reflection> {
    let mut active: Vec<&Reflection> = reflections.iter().filter(|r| !r.archived).collect();
    active.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    active.truncate(limit);
    active
}

/// Whether a directive narrows or widens the active task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    /// "focus on X": up-weight matching tasks
    Include,
    /// "ignore X": drop matching tasks, steer generation away
    Exclude,
}

impl DirectiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Exclude => "exclude",
        }
    }
}

/// An interpreted instruction extracted from one reflection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionDirective {
    pub reflection_id: Uuid,
    pub reflection_text: String,
    pub kind: DirectiveKind,
    pub topic: String,
    /// Stemmed keywords used for topic matching
    pub keywords: Vec<String>,
    /// Recency weight at interpretation time
    pub weight: f64,
}
