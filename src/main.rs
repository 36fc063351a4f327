//! task-intel CLI entry point.

use clap::Parser;

use task_intel::cli::commands::{self, analyze, config, fingerprint, sort};
use task_intel::cli::{handle_error, Cli, Commands};
use task_intel::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match commands::load_config(cli.config_dir.as_ref()) {
        Ok(settings) => settings,
        Err(err) => handle_error(err, cli.json),
    };

    let _logger = match LoggerImpl::init(&LogConfig::from_settings(&settings.logging)) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("Failed to initialize logging: {err:#}");
            None
        }
    };

    let result = match cli.command {
        Commands::Analyze(args) => analyze::execute(args, settings, cli.json).await,
        Commands::Sort(args) => sort::execute(args, settings, cli.json).await,
        Commands::Fingerprint(args) => fingerprint::execute(args, cli.json).await,
        Commands::Config(args) => config::execute(args, settings, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
