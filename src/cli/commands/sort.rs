//! `task-intel sort`: re-order stored scores under a strategy.
//!
//! No inference calls. Reflections are read with the offline interpreter so
//! excluded topics stay out of the ordering.

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use console::style;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::commands::load_session;
use crate::cli::output::table::PlanRow;
use crate::cli::output::{output, CommandOutput, PlanTableFormatter};
use crate::domain::models::reflection::active_most_recent_first;
use crate::domain::models::{Config, Exclusion, Reflection, SortStrategy, Task};
use crate::services::reflection_interpreter::interpret_heuristic;
use crate::services::{apply_directives, SortingEngine};

#[derive(Args, Debug)]
pub struct SortArgs {
    /// Session file (JSON)
    #[arg(short, long)]
    pub session: PathBuf,

    /// Sort strategy; defaults to the session's strategy
    #[arg(long)]
    pub strategy: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SortOutput {
    pub strategy: SortStrategy,
    pub plan: Vec<PlanRow>,
    pub exclusions: Vec<Exclusion>,
    /// Tasks without a quality score yet
    pub unevaluated: usize,
}

impl CommandOutput for SortOutput {
    fn to_human(&self) -> String {
        let formatter = PlanTableFormatter::new();
        let mut lines = vec![format!("{} ({})", style("Ordering").bold(), self.strategy)];

        if self.plan.is_empty() {
            lines.push("No active tasks.".to_string());
        } else {
            lines.push(formatter.format_plan(&self.plan));
        }
        if self.unevaluated > 0 {
            lines.push(format!(
                "{} task(s) have no quality score yet; run `task-intel analyze --write` first.",
                self.unevaluated
            ));
        }
        if !self.exclusions.is_empty() {
            lines.push(format!("\n{}", style("Excluded by reflections").bold()));
            lines.push(formatter.format_exclusions(&self.exclusions));
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Order `tasks` offline under `strategy`.
pub fn sort_offline(
    config: &Config,
    tasks: &[Task],
    reflections: &[Reflection],
    strategy: SortStrategy,
) -> SortOutput {
    let recent = active_most_recent_first(reflections, config.reflections.max_reflections);
    let directives = interpret_heuristic(&recent, Utc::now(), config.reflections.half_life_hours);
    let applied = apply_directives(tasks, &directives, config.reflections.inclusion_boost);

    let engine = SortingEngine::from_config(&config.sorting);
    let ordered = engine.sort(&applied.active, strategy, &applied.boosts);

    let plan = ordered
        .iter()
        .filter_map(|id| applied.active.iter().find(|t| &t.id == id))
        .enumerate()
        .map(|(index, task)| {
            PlanRow::from_task(index + 1, task, applied.boosts.get(&task.id).copied().unwrap_or(0.0))
        })
        .collect();

    SortOutput {
        strategy,
        plan,
        unevaluated: applied.active.iter().filter(|t| t.quality_score.is_none()).count(),
        exclusions: applied.exclusions,
    }
}

pub async fn execute(args: SortArgs, config: Config, json_mode: bool) -> Result<()> {
    let snapshot = load_session(&args.session)?;
    let strategy = match &args.strategy {
        Some(name) => name.parse()?,
        None => snapshot.strategy,
    };

    let result = sort_offline(&config, &snapshot.tasks, &snapshot.reflections, strategy);
    output(&result, json_mode);
    Ok(())
}
