//! Table output formatting for CLI commands
//!
//! Renders plans, exclusions, coverage facets and drafts with comfy-table.
//! Colors are dropped when the terminal cannot show them.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use std::env;

use crate::cli::output::truncate;
use crate::domain::models::{CoverageFacet, DraftTask, Exclusion, QualityTier, Task};

/// One line of a displayed plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanRow {
    pub position: usize,
    pub id: String,
    pub text: String,
    pub quality: Option<u8>,
    pub tier: Option<QualityTier>,
    pub priority: f64,
    pub boost: f64,
}

impl PlanRow {
    pub fn from_task(position: usize, task: &Task, boost: f64) -> Self {
        Self {
            position,
            id: task.id.clone(),
            text: task.text.clone(),
            quality: task.quality_score,
            tier: task.quality_tier,
            priority: task.strategic_or_neutral().priority,
            boost,
        }
    }
}

/// Table formatter for plan output
pub struct PlanTableFormatter {
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<usize>,
}

impl PlanTableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub fn with_config(use_colors: bool, max_width: Option<usize>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// Format ordered plan rows
    pub fn format_plan(&self, rows: &[PlanRow]) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("ID").add_attribute(Attribute::Bold),
            Cell::new("Task").add_attribute(Attribute::Bold),
            Cell::new("Quality").add_attribute(Attribute::Bold),
            Cell::new("Priority").add_attribute(Attribute::Bold),
        ]);

        for row in rows {
            let quality = match (row.quality, row.tier) {
                (Some(score), Some(tier)) => format!("{score} ({})", tier.as_str()),
                (Some(score), None) => score.to_string(),
                _ => "-".to_string(),
            };
            let quality_cell = match row.tier {
                Some(tier) if self.use_colors => Cell::new(quality).fg(tier_color(tier)),
                _ => Cell::new(quality),
            };
            let priority = if row.boost > 0.0 {
                format!("{:.1} (+{:.1})", row.priority, row.boost)
            } else {
                format!("{:.1}", row.priority)
            };

            table.add_row(vec![
                Cell::new(row.position),
                Cell::new(truncate(&row.id, 12)),
                Cell::new(truncate(&row.text, 60)),
                quality_cell,
                Cell::new(priority),
            ]);
        }

        table.to_string()
    }

    /// Format tasks removed by reflections
    pub fn format_exclusions(&self, exclusions: &[Exclusion]) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![
            Cell::new("ID").add_attribute(Attribute::Bold),
            Cell::new("Topic").add_attribute(Attribute::Bold),
            Cell::new("Reason").add_attribute(Attribute::Bold),
        ]);

        for exclusion in exclusions {
            let topic = if self.use_colors {
                Cell::new(&exclusion.topic).fg(Color::DarkGrey)
            } else {
                Cell::new(&exclusion.topic)
            };
            table.add_row(vec![
                Cell::new(truncate(&exclusion.task_id, 12)),
                topic,
                Cell::new(truncate(&exclusion.reason, 70)),
            ]);
        }

        table.to_string()
    }

    /// Format coverage facets
    pub fn format_facets(&self, facets: &[CoverageFacet]) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![
            Cell::new("Facet").add_attribute(Attribute::Bold),
            Cell::new("Covered").add_attribute(Attribute::Bold),
            Cell::new("Tasks").add_attribute(Attribute::Bold),
        ]);

        for facet in facets {
            let covered = match (facet.covered, self.use_colors) {
                (true, true) => Cell::new("yes").fg(Color::Green),
                (false, true) => Cell::new("no").fg(Color::Red),
                (true, false) => Cell::new("✓ yes"),
                (false, false) => Cell::new("✗ no"),
            };
            let tasks = if facet.covering_task_ids.is_empty() {
                "-".to_string()
            } else {
                facet.covering_task_ids.join(", ")
            };
            table.add_row(vec![
                Cell::new(truncate(&facet.name, 40)),
                covered,
                Cell::new(truncate(&tasks, 40)),
            ]);
        }

        table.to_string()
    }

    /// Format pending drafts
    pub fn format_drafts(&self, drafts: &[DraftTask]) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![
            Cell::new("ID").add_attribute(Attribute::Bold),
            Cell::new("Draft").add_attribute(Attribute::Bold),
            Cell::new("Gap").add_attribute(Attribute::Bold),
            Cell::new("Nearest").add_attribute(Attribute::Bold),
        ]);

        for draft in drafts {
            let nearest = match (&draft.nearest_task_id, draft.similarity) {
                (Some(id), Some(similarity)) => format!("{id} ({similarity:.2})"),
                _ => "-".to_string(),
            };
            let nearest_cell = if self.use_colors && draft.borderline {
                Cell::new(nearest).fg(Color::Yellow)
            } else {
                Cell::new(nearest)
            };
            table.add_row(vec![
                Cell::new(&draft.id.to_string()[..8]),
                Cell::new(truncate(&draft.text, 60)),
                Cell::new(truncate(&draft.gap, 30)),
                nearest_cell,
            ]);
        }

        table.to_string()
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width as u16);
        }

        table
    }
}

impl Default for PlanTableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if color output is supported
pub fn supports_color() -> bool {
    // Respect NO_COLOR environment variable
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    console::colors_enabled()
}

fn tier_color(tier: QualityTier) -> Color {
    match tier {
        QualityTier::Excellent => Color::Green,
        QualityTier::Good => Color::Yellow,
        QualityTier::NeedsWork => Color::Red,
    }
}
