//! Reflection interpretation.
//!
//! Turns free-text steering notes into include/exclude directives and
//! applies them to the task set. Interpretation asks the inference provider
//! first and falls back to phrase patterns ("ignore X", "focus on Y").
//! Directives are ordered most-recent reflection first; when directives
//! disagree about a task, the most recent one wins.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::models::reflection::active_most_recent_first;
use crate::domain::models::{
    DirectiveKind, Exclusion, Reflection, ReflectionConfig, ReflectionDirective, Task,
};
use crate::domain::ports::{Prompt, ResponseSchema};
use crate::domain::text;
use crate::services::inference_client::InferenceClient;
use crate::services::retry_controller::CallOutcome;

pub const DIRECTIVE_SCHEMA: &str = "reflection_directives";

/// Words that carry the directive itself rather than its topic.
const FILLER: &[&str] = &[
    "want", "need", "care", "bother", "worry", "focus", "more", "less", "anymore", "any", "now",
    "please", "just", "only", "really", "too", "much", "lot", "should", "must", "let", "lets",
    "right", "yet", "also", "again", "doing", "working", "stuff", "spend", "time", "effort",
];

static CLAUSE_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[.;!?\n]+|\bbut\b|\bhowever\b").expect("directive pattern is valid")
});

static EXCLUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:ignore|skip|exclude|avoid|drop|forget(?:\s+about)?|deprioriti[sz]e|leave\s+out|stop(?:\s+(?:doing|working\s+on))?|(?:do\s*not|don'?t|dont|never)(?:\s+(?:do|include|care\s+about|bother\s+with|work\s+on|need|want|prioriti[sz]e))?)\s+(?P<topic>[^,]+)",
    )
    .expect("directive pattern is valid")
});

static EXCLUDE_NO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:no|not|without)\s+(?:more\s+)?(?P<topic>[^,]+)")
        .expect("directive pattern is valid")
});

static INCLUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:focus(?:\s+more)?\s+on|prioriti[sz]e|emphasi[sz]e|concentrate\s+on|double\s+down\s+on|more\s+(?:of\s+)?|lean\s+into|push\s+on)\s*(?P<topic>[^,]+)",
    )
    .expect("directive pattern is valid")
});

#[derive(Debug, Clone, Deserialize)]
struct DirectiveList {
    directives: Vec<RawDirective>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDirective {
    reflection_id: String,
    kind: DirectiveKind,
    topic: String,
    #[serde(default)]
    keywords: Vec<String>,
}

pub fn directive_schema() -> ResponseSchema {
    ResponseSchema::new(
        DIRECTIVE_SCHEMA,
        vec!["directives"],
        json!({
            "type": "object",
            "properties": {
                "directives": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "reflection_id": {"type": "string"},
                            "kind": {"type": "string", "enum": ["include", "exclude"]},
                            "topic": {"type": "string"},
                            "keywords": {"type": "array", "items": {"type": "string"}}
                        },
                        "required": ["reflection_id", "kind", "topic", "keywords"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["directives"],
            "additionalProperties": false
        }),
    )
}

pub struct ReflectionInterpreter {
    client: Arc<InferenceClient>,
    config: ReflectionConfig,
}

impl ReflectionInterpreter {
    pub fn new(client: Arc<InferenceClient>, config: ReflectionConfig) -> Self {
        Self { client, config }
    }

    /// Directives from the most recent active reflections.
    pub async fn interpret(&self, reflections: &[Reflection]) -> CallOutcome<Vec<ReflectionDirective>> {
        let active = active_most_recent_first(reflections, self.config.max_reflections);
        if active.is_empty() {
            return CallOutcome {
                value: Vec::new(),
                degraded: false,
                attempts: 0,
                error: None,
            };
        }

        let now = Utc::now();
        let half_life = self.config.half_life_hours;
        let prompt = build_prompt(&active);

        let outcome = self
            .client
            .complete_or_else("reflections", &prompt, &directive_schema(), |_| {
                DirectiveList {
                    directives: Vec::new(),
                }
            })
            .await;

        let degraded = outcome.degraded;
        let directives = if degraded {
            interpret_heuristic(&active, now, half_life)
        } else {
            from_inference(outcome.value, &active, now, half_life)
        };

        info!(
            reflections = active.len(),
            directives = directives.len(),
            degraded,
            "Reflections interpreted"
        );
        CallOutcome {
            value: directives,
            degraded,
            attempts: outcome.attempts,
            error: outcome.error,
        }
    }
}

fn build_prompt(active: &[&Reflection]) -> Prompt {
    let listing = active
        .iter()
        .map(|r| format!("- id={} ({}): {}", r.id, r.created_at.format("%Y-%m-%d"), r.text))
        .collect::<Vec<_>>()
        .join("\n");
    Prompt::new(
        "You read a user's steering notes about their task list. For each note extract \
         directives: 'exclude' when the user wants a topic ignored or avoided, 'include' when \
         they want more focus on a topic. Give the topic as a short noun phrase and list the \
         keywords a matching task would contain. Notes without a directive produce nothing.",
        format!("Notes, most recent first:\n{listing}"),
    )
}

fn from_inference(
    list: DirectiveList,
    active: &[&Reflection],
    now: DateTime<Utc>,
    half_life: f64,
) -> Vec<ReflectionDirective> {
    let by_id: HashMap<Uuid, (usize, &Reflection)> = active
        .iter()
        .enumerate()
        .map(|(rank, r)| (r.id, (rank, *r)))
        .collect();

    let mut ranked: Vec<(usize, ReflectionDirective)> = list
        .directives
        .into_iter()
        .filter_map(|raw| {
            let id = Uuid::parse_str(raw.reflection_id.trim()).ok()?;
            let Some((rank, reflection)) = by_id.get(&id) else {
                debug!(reflection_id = %id, "Directive cites unknown reflection, dropped");
                return None;
            };
            let mut keywords = topic_keywords(&raw.topic);
            for extra in raw.keywords.iter().flat_map(|k| topic_keywords(k)) {
                if !keywords.contains(&extra) {
                    keywords.push(extra);
                }
            }
            (!keywords.is_empty()).then(|| {
                (
                    *rank,
                    ReflectionDirective {
                        reflection_id: reflection.id,
                        reflection_text: reflection.text.clone(),
                        kind: raw.kind,
                        topic: raw.topic.trim().to_string(),
                        keywords,
                        weight: reflection.recency_weight(now, half_life),
                    },
                )
            })
        })
        .collect();

    ranked.sort_by_key(|(rank, _)| *rank);
    ranked.into_iter().map(|(_, d)| d).collect()
}

/// Pattern-based interpretation used when inference is unavailable.
///
/// `active` must already be ordered most recent first.
pub fn interpret_heuristic(
    active: &[&Reflection],
    now: DateTime<Utc>,
    half_life_hours: f64,
) -> Vec<ReflectionDirective> {
    let mut directives = Vec::new();
    for reflection in active {
        for (kind, topic) in extract_directives(&reflection.text) {
            let keywords = topic_keywords(&topic);
            if keywords.is_empty() {
                continue;
            }
            directives.push(ReflectionDirective {
                reflection_id: reflection.id,
                reflection_text: reflection.text.clone(),
                kind,
                topic,
                keywords,
                weight: reflection.recency_weight(now, half_life_hours),
            });
        }
    }
    directives
}

/// (kind, topic) pairs found in one note, in textual order.
pub fn extract_directives(note: &str) -> Vec<(DirectiveKind, String)> {
    let mut found = Vec::new();
    for clause in CLAUSE_SPLIT.split(note) {
        let mut excludes: Vec<Range<usize>> = Vec::new();
        let leading = EXCLUDE_NO.captures(clause).and_then(|c| c.name("topic"));
        for topic in leading
            .into_iter()
            .chain(EXCLUDE.captures_iter(clause).filter_map(|c| c.name("topic")))
        {
            // "never skip X" yields a nested match inside the outer topic
            if !excludes.iter().any(|r| r.contains(&topic.start())) {
                excludes.push(topic.range());
            }
        }

        // "don't focus on X" is a negation, not a focus
        let includes: Vec<Range<usize>> = INCLUDE
            .captures_iter(clause)
            .filter(|c| {
                c.get(0).is_some_and(|m| {
                    !excludes
                        .iter()
                        .any(|r| r.start < m.end() && m.start() < r.end)
                })
            })
            .filter_map(|c| c.name("topic").map(|t| t.range()))
            .collect();

        let mut hits: Vec<(Range<usize>, DirectiveKind)> = excludes
            .into_iter()
            .map(|r| (r, DirectiveKind::Exclude))
            .chain(includes.into_iter().map(|r| (r, DirectiveKind::Include)))
            .collect();
        hits.sort_by_key(|(range, _)| range.start);
        found.extend(
            hits.into_iter()
                .map(|(range, kind)| (kind, clause[range].trim().to_string())),
        );
    }
    found
}

fn topic_keywords(topic: &str) -> Vec<String> {
    text::keywords_without(topic, FILLER)
}

/// Effect of directives on a task set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectiveApplication {
    /// Tasks left after exclusions, in input order
    pub active: Vec<Task>,
    pub exclusions: Vec<Exclusion>,
    /// Additive combined-priority boost per task id
    pub boosts: HashMap<String, f64>,
}

/// Whether `task` falls under the directive's topic.
pub fn matches_topic(directive: &ReflectionDirective, task_text: &str) -> bool {
    text::mentions_any(task_text, &directive.keywords)
}

/// Apply directives to `tasks`.
///
/// For each task the first matching directive (most recent reflection)
/// decides between exclusion and inclusion. Every matching inclusion adds
/// `inclusion_boost` scaled by its recency weight.
pub fn apply_directives(
    tasks: &[Task],
    directives: &[ReflectionDirective],
    inclusion_boost: f64,
) -> DirectiveApplication {
    let mut application = DirectiveApplication::default();

    for task in tasks {
        let matching: Vec<&ReflectionDirective> = directives
            .iter()
            .filter(|d| matches_topic(d, &task.text))
            .collect();

        match matching.first() {
            Some(directive) if directive.kind == DirectiveKind::Exclude => {
                info!(
                    task_id = %task.id,
                    reflection_id = %directive.reflection_id,
                    topic = %directive.topic,
                    "Task excluded by reflection"
                );
                application.exclusions.push(Exclusion {
                    task_id: task.id.clone(),
                    reflection_id: directive.reflection_id,
                    topic: directive.topic.clone(),
                    reason: format!(
                        "Excluded by reflection \"{}\" (topic: {})",
                        directive.reflection_text, directive.topic
                    ),
                });
            }
            _ => {
                let boost: f64 = matching
                    .iter()
                    .filter(|d| d.kind == DirectiveKind::Include)
                    .map(|d| inclusion_boost * d.weight)
                    .sum();
                if boost > 0.0 {
                    application.boosts.insert(task.id.clone(), boost);
                }
                application.active.push(task.clone());
            }
        }
    }

    application
}

/// Topics generation should steer away from.
pub fn excluded_topics(directives: &[ReflectionDirective]) -> Vec<&ReflectionDirective> {
    directives
        .iter()
        .filter(|d| d.kind == DirectiveKind::Exclude)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::inference::{MockInferenceProvider, MockReply};
    use crate::services::retry_controller::{RetryController, RetryPolicy};
    use chrono::Duration;

    fn interpreter(provider: Arc<MockInferenceProvider>) -> ReflectionInterpreter {
        let retry = Arc::new(RetryController::new(RetryPolicy::default(), 4));
        ReflectionInterpreter::new(
            Arc::new(InferenceClient::new(provider, retry)),
            ReflectionConfig::default(),
        )
    }

    fn kinds_and_keywords(note: &str) -> Vec<(DirectiveKind, Vec<String>)> {
        extract_directives(note)
            .into_iter()
            .map(|(kind, topic)| (kind, topic_keywords(&topic)))
            .collect()
    }

    #[test]
    fn test_extract_negations() {
        assert_eq!(
            kinds_and_keywords("ignore documentation tasks"),
            vec![(DirectiveKind::Exclude, vec!["documentation".to_string()])]
        );
        assert_eq!(
            kinds_and_keywords("Please don't bother with marketing"),
            vec![(DirectiveKind::Exclude, vec!["marketing".to_string()])]
        );
        assert_eq!(
            kinds_and_keywords("No more refactoring."),
            vec![(DirectiveKind::Exclude, vec!["refactoring".to_string()])]
        );
    }

    #[test]
    fn test_extract_mixed_clauses() {
        let found = kinds_and_keywords("Focus on mobile payments; skip the docs");
        assert_eq!(
            found,
            vec![
                (DirectiveKind::Include, vec!["mobile".to_string(), "payment".to_string()]),
                (DirectiveKind::Exclude, vec!["doc".to_string()]),
            ]
        );
    }

    #[test]
    fn test_negated_focus_is_exclusion() {
        let found = kinds_and_keywords("don't focus on hiring");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, DirectiveKind::Exclude);
        assert_eq!(found[0].1, vec!["hiring".to_string()]);
    }

    #[test]
    fn test_filler_words_never_become_topic_keywords() {
        let reflection = Reflection::new("don't focus on hiring");
        let directives = interpret_heuristic(&[&reflection], Utc::now(), 168.0);
        let tasks = vec![
            Task::manual("copy", "Focus landing page copy on checkout benefits"),
            Task::manual("hiring", "Run hiring interviews"),
        ];

        let applied = apply_directives(&tasks, &directives, 15.0);

        let excluded: Vec<&str> = applied.exclusions.iter().map(|e| e.task_id.as_str()).collect();
        assert_eq!(excluded, vec!["hiring"]);
        assert_eq!(applied.active.len(), 1);
        assert_eq!(applied.active[0].id, "copy");
    }

    #[tokio::test]
    async fn test_inference_keywords_drop_filler() {
        let provider = Arc::new(MockInferenceProvider::new());
        let reflection = Reflection::new("Stop doing so much hiring");
        provider
            .push_reply(
                DIRECTIVE_SCHEMA,
                MockReply::Respond(json!({
                    "directives": [
                        {"reflection_id": reflection.id.to_string(), "kind": "exclude",
                         "topic": "hiring", "keywords": ["focus", "doing", "recruiting"]}
                    ]
                })),
            )
            .await;

        let outcome = interpreter(provider).interpret(&[reflection]).await;
        assert_eq!(outcome.value[0].keywords, vec!["hiring", "recruiting"]);
    }

    #[test]
    fn test_apply_excludes_with_reason_and_boosts_focus() {
        let ignore = Reflection::new("ignore documentation tasks");
        let focus = Reflection::new("focus on payments");
        let active = vec![&focus, &ignore];
        let directives = interpret_heuristic(&active, Utc::now(), 168.0);
        let tasks = vec![
            Task::manual("docs", "Update API docs"),
            Task::manual("pay", "Implement Apple Pay"),
            Task::manual("hire", "Hire a designer"),
        ];

        let applied = apply_directives(&tasks, &directives, 15.0);

        assert_eq!(applied.active.len(), 2);
        assert_eq!(applied.exclusions.len(), 1);
        assert_eq!(applied.exclusions[0].task_id, "docs");
        assert_eq!(applied.exclusions[0].reflection_id, ignore.id);
        assert!(applied.exclusions[0].reason.contains("ignore documentation tasks"));
        let boost = applied.boosts.get("pay").copied().unwrap_or_default();
        assert!(boost > 14.9 && boost <= 15.0);
        assert!(!applied.boosts.contains_key("hire"));
    }

    #[test]
    fn test_most_recent_directive_wins() {
        let old = Reflection::new("ignore payments").with_created_at(Utc::now() - Duration::days(3));
        let new = Reflection::new("focus on payments");
        let active = vec![&new, &old];
        let directives = interpret_heuristic(&active, Utc::now(), 168.0);

        let applied = apply_directives(&[Task::manual("p", "Payment retries")], &directives, 10.0);
        assert!(applied.exclusions.is_empty());
        assert_eq!(applied.active.len(), 1);
    }

    #[tokio::test]
    async fn test_inference_directives_are_mapped_to_reflections() {
        let provider = Arc::new(MockInferenceProvider::new());
        let reflection = Reflection::new("The docs can wait");
        provider
            .push_reply(
                DIRECTIVE_SCHEMA,
                MockReply::Respond(json!({
                    "directives": [
                        {"reflection_id": reflection.id.to_string(), "kind": "exclude",
                         "topic": "documentation", "keywords": ["docs", "readme"]},
                        {"reflection_id": Uuid::new_v4().to_string(), "kind": "include",
                         "topic": "ghost", "keywords": []}
                    ]
                })),
            )
            .await;

        let outcome = interpreter(provider).interpret(&[reflection.clone()]).await;
        assert!(!outcome.degraded);
        assert_eq!(outcome.value.len(), 1);
        let directive = &outcome.value[0];
        assert_eq!(directive.kind, DirectiveKind::Exclude);
        assert_eq!(directive.keywords, vec!["documentation", "doc", "readme"]);
        assert!(matches_topic(directive, "Update API docs"));
    }

    #[tokio::test]
    async fn test_unavailable_inference_uses_patterns() {
        let provider = Arc::new(MockInferenceProvider::new());
        let outcome = interpreter(provider)
            .interpret(&[Reflection::new("ignore documentation tasks")])
            .await;
        assert!(outcome.degraded);
        assert_eq!(outcome.value.len(), 1);
        assert_eq!(outcome.value[0].kind, DirectiveKind::Exclude);
    }

    #[tokio::test]
    async fn test_archived_reflections_are_ignored() {
        let provider = Arc::new(MockInferenceProvider::new());
        let mut old = Reflection::new("ignore payments");
        let _replacement = old.supersede("focus on payments");
        let outcome = interpreter(provider.clone()).interpret(&[old]).await;
        assert!(outcome.value.is_empty());
        assert_eq!(provider.complete_calls(), 0);
    }
}
