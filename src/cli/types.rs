//! CLI type definitions
//!
//! Clap command structures for the `task-intel` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::{
    analyze::AnalyzeArgs, config::ConfigArgs, fingerprint::FingerprintArgs, sort::SortArgs,
};

#[derive(Parser)]
#[command(name = "task-intel")]
#[command(about = "Task intelligence: coverage, drafts, deduplication, quality and prioritization", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration directory (defaults to .task-intel)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a full analysis pass over a session file
    Analyze(AnalyzeArgs),

    /// Re-order a session's tasks from stored scores, without inference
    Sort(SortArgs),

    /// Print the normalized text and deduplication fingerprint
    Fingerprint(FingerprintArgs),

    /// Inspect configuration
    Config(ConfigArgs),
}
