//! Negation handling over a fixed corpus of reflections.
//!
//! The offline test measures the pattern interpreter. The live test runs the
//! same corpus through the configured OpenAI endpoint and is ignored unless
//! `OPENAI_API_KEY` is set and the test is requested explicitly.

mod common;

use chrono::Utc;

use task_intel::domain::models::{RecalcTrigger, Reflection, Task};
use task_intel::services::reflection_interpreter::interpret_heuristic;
use task_intel::services::{apply_directives, SessionSnapshot};
use task_intel::AppContext;

const REQUIRED_ACCURACY: f64 = 0.95;

struct Scenario {
    reflection: &'static str,
    doc_task: &'static str,
    other_task: &'static str,
    /// Whether the documentation task should be excluded
    excludes_doc: bool,
}

const fn scenario(
    reflection: &'static str,
    doc_task: &'static str,
    other_task: &'static str,
    excludes_doc: bool,
) -> Scenario {
    Scenario {
        reflection,
        doc_task,
        other_task,
        excludes_doc,
    }
}

const CORPUS: &[Scenario] = &[
    scenario("ignore documentation tasks", "Update API docs", "Implement Apple Pay", true),
    scenario("Skip the docs for now", "Update API docs", "Reduce checkout latency", true),
    scenario("Don't work on documentation", "Write README documentation", "Implement Apple Pay", true),
    scenario("No more documentation work", "Document the webhook endpoints", "Add fraud detection rules", true),
    scenario("Avoid documentation; payments matter most", "Update API docs", "Implement Apple Pay", true),
    scenario("Forget about writing docs", "Update API docs", "Launch referral campaign", true),
    scenario("Deprioritize documentation", "Write README documentation", "Reduce checkout latency", true),
    scenario("Leave out documentation updates", "Document the webhook endpoints", "Implement Apple Pay", true),
    scenario("Stop working on the docs", "Update API docs", "Add fraud detection rules", true),
    scenario("We should drop documentation tasks this sprint", "Write README documentation", "Implement Apple Pay", true),
    scenario("Never prioritize documentation", "Update API docs", "Launch referral campaign", true),
    scenario("Don't focus on documentation", "Document the webhook endpoints", "Reduce checkout latency", true),
    scenario("Exclude anything related to docs", "Update API docs", "Implement Apple Pay", true),
    scenario("Not documentation right now", "Write README documentation", "Add fraud detection rules", true),
    scenario("Please skip documentation tasks", "Update API docs", "Reduce checkout latency", true),
    scenario("Ignore docs but focus on payments", "Update API docs", "Implement Apple Pay", true),
    scenario("I don't want documentation in the plan", "Document the webhook endpoints", "Launch referral campaign", true),
    scenario("Avoid docs", "Write documentation for the SDK", "Implement Apple Pay", true),
    scenario("Focus on documentation", "Update API docs", "Implement Apple Pay", false),
    scenario("Prioritize docs this week", "Write README documentation", "Reduce checkout latency", false),
    scenario("More documentation please", "Document the webhook endpoints", "Add fraud detection rules", false),
];

/// Whether `excluded` ids match the scenario's expectation.
fn judged_correct(scenario: &Scenario, excluded: &[String]) -> bool {
    let doc_excluded = excluded.iter().any(|id| id == "doc");
    let other_excluded = excluded.iter().any(|id| id == "other");
    doc_excluded == scenario.excludes_doc && !other_excluded
}

fn tasks_for(scenario: &Scenario) -> Vec<Task> {
    vec![
        Task::manual("doc", scenario.doc_task),
        Task::manual("other", scenario.other_task),
    ]
}

fn report(misses: &[&str]) -> String {
    format!("misjudged reflections: {misses:?}")
}

#[test]
fn test_offline_interpreter_meets_accuracy_bar() {
    let mut misses = Vec::new();

    for scenario in CORPUS {
        let reflection = Reflection::new(scenario.reflection);
        let directives = interpret_heuristic(&[&reflection], Utc::now(), 168.0);
        let applied = apply_directives(&tasks_for(scenario), &directives, 15.0);
        let excluded: Vec<String> = applied.exclusions.iter().map(|e| e.task_id.clone()).collect();

        if !judged_correct(scenario, &excluded) {
            misses.push(scenario.reflection);
        }
    }

    let accuracy = 1.0 - misses.len() as f64 / CORPUS.len() as f64;
    assert!(accuracy >= REQUIRED_ACCURACY, "accuracy {accuracy:.2}, {}", report(&misses));
}

#[test]
fn test_offline_exclusion_reason_cites_reflection() {
    let reflection = Reflection::new("ignore documentation tasks");
    let directives = interpret_heuristic(&[&reflection], Utc::now(), 168.0);
    let applied = apply_directives(&tasks_for(&CORPUS[0]), &directives, 15.0);

    assert_eq!(applied.exclusions.len(), 1);
    assert_eq!(applied.exclusions[0].reflection_id, reflection.id);
    assert!(applied.exclusions[0].reason.contains("\"ignore documentation tasks\""));
}

#[tokio::test]
#[ignore = "calls the live inference API; needs OPENAI_API_KEY"]
async fn test_live_interpreter_meets_accuracy_bar() {
    if std::env::var("OPENAI_API_KEY").map_or(true, |key| key.is_empty()) {
        eprintln!("OPENAI_API_KEY not set, skipping");
        return;
    }

    let mut config = common::offline_config();
    config.inference.provider = "openai".to_string();
    let context = AppContext::from_config(config).await.unwrap();
    let mut misses = Vec::new();

    for scenario in CORPUS {
        let session = context.open_session(SessionSnapshot {
            outcome: "Increase payment conversion by 20%".to_string(),
            tasks: tasks_for(scenario),
            reflections: vec![Reflection::new(scenario.reflection)],
            ..SessionSnapshot::default()
        });
        session.recalculate(RecalcTrigger::Manual).await.unwrap();
        let plan = session.current_plan().await.unwrap();
        let excluded: Vec<String> = plan.exclusions.iter().map(|e| e.task_id.clone()).collect();

        if !judged_correct(scenario, &excluded) {
            misses.push(scenario.reflection);
        }
    }

    let accuracy = 1.0 - misses.len() as f64 / CORPUS.len() as f64;
    assert!(accuracy >= REQUIRED_ACCURACY, "accuracy {accuracy:.2}, {}", report(&misses));
}
