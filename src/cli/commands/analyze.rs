//! `task-intel analyze`: one full pass over a session file.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::application::AppContext;
use crate::cli::commands::{load_session, save_session};
use crate::cli::output::table::PlanRow;
use crate::cli::output::{output, CommandOutput, PlanTableFormatter};
use crate::domain::models::{
    Config, CoverageResult, DraftTask, Exclusion, PriorityPlan, RecalcStatus, RecalcTrigger,
    SortStrategy, Task,
};
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Session file (JSON)
    #[arg(short, long)]
    pub session: PathBuf,

    /// Sort strategy (balanced, quick-wins, strategic-bets, high-confidence, quality-first)
    #[arg(long)]
    pub strategy: Option<String>,

    /// Inference provider override (openai, mock)
    #[arg(long)]
    pub provider: Option<String>,

    /// Write scores, new drafts and the strategy back to the session file
    #[arg(short, long)]
    pub write: bool,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeOutput {
    pub plan_version: u64,
    pub strategy: SortStrategy,
    pub degraded: bool,
    pub plan: Vec<PlanRow>,
    pub exclusions: Vec<Exclusion>,
    pub coverage: Option<CoverageResult>,
    pub drafts: Vec<DraftTask>,
    pub written: bool,
}

impl AnalyzeOutput {
    fn from_plan(
        plan: &PriorityPlan,
        tasks: &[Task],
        boosts: &HashMap<String, f64>,
        drafts: Vec<DraftTask>,
    ) -> Self {
        let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let rows = plan
            .ordered_ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()))
            .enumerate()
            .map(|(index, task)| {
                PlanRow::from_task(index + 1, task, boosts.get(&task.id).copied().unwrap_or(0.0))
            })
            .collect();

        Self {
            plan_version: plan.version,
            strategy: plan.strategy,
            degraded: plan.degraded,
            plan: rows,
            exclusions: plan.exclusions.clone(),
            coverage: plan.coverage.clone(),
            drafts,
            written: false,
        }
    }
}

impl CommandOutput for AnalyzeOutput {
    fn to_human(&self) -> String {
        let formatter = PlanTableFormatter::new();
        let mut lines = vec![format!(
            "{} v{} ({})",
            style("Plan").bold(),
            self.plan_version,
            self.strategy
        )];
        if self.degraded {
            lines.push(
                style("Some scores came from offline heuristics; inference was unavailable.")
                    .yellow()
                    .to_string(),
            );
        }

        if self.plan.is_empty() {
            lines.push("No active tasks.".to_string());
        } else {
            lines.push(formatter.format_plan(&self.plan));
        }

        if !self.exclusions.is_empty() {
            lines.push(format!("\n{}", style("Excluded by reflections").bold()));
            lines.push(formatter.format_exclusions(&self.exclusions));
        }

        if let Some(coverage) = &self.coverage {
            let mut heading = format!(
                "\n{} {}% of {} task(s)",
                style("Coverage").bold(),
                coverage.percentage,
                coverage.task_count_considered
            );
            if coverage.low_confidence {
                heading.push_str(" (low confidence)");
            }
            if coverage.partial {
                heading.push_str(" (partial)");
            }
            lines.push(heading);
            if !coverage.facets.is_empty() {
                lines.push(formatter.format_facets(&coverage.facets));
            }
        }

        if !self.drafts.is_empty() {
            lines.push(format!("\n{} ({})", style("Suggested drafts").bold(), self.drafts.len()));
            lines.push(formatter.format_drafts(&self.drafts));
        }

        if self.written {
            lines.push("\nSession file updated.".to_string());
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: AnalyzeArgs, mut config: Config, json_mode: bool) -> Result<()> {
    let mut snapshot = load_session(&args.session)?;
    if let Some(name) = &args.strategy {
        snapshot.strategy = name.parse()?;
    }
    if let Some(provider) = args.provider {
        config.inference.provider = provider;
        ConfigLoader::validate(&config)?;
    }

    let context = AppContext::from_config(config)
        .await
        .context("Failed to initialize the analysis pipeline")?;
    let session = context.open_session(snapshot);

    let outcome = session.recalculate(RecalcTrigger::Manual).await?;
    if outcome.status == RecalcStatus::Stale {
        anyhow::bail!("Session changed during analysis; run the command again");
    }
    let plan = session
        .current_plan()
        .await
        .context("Analysis finished without publishing a plan")?;

    let updated = session.snapshot().await;
    let mut result = AnalyzeOutput::from_plan(
        &plan,
        &updated.tasks,
        &session.boosts().await,
        session.pending_drafts().await,
    );

    if args.write {
        save_session(&args.session, &updated)?;
        result.written = true;
    }

    output(&result, json_mode);
    Ok(())
}
