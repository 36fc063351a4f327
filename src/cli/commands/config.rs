//! `task-intel config`: inspect the layered configuration.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the merged configuration
    Show,
    /// Validate the configuration and list recalibrated thresholds
    Validate,
}

#[derive(Debug, Serialize)]
pub struct ConfigShowOutput {
    #[serde(flatten)]
    pub config: Config,
    #[serde(skip)]
    yaml: String,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        self.yaml.trim_end().to_string()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigValidateOutput {
    pub valid: bool,
    pub recalibrated: Vec<String>,
}

impl CommandOutput for ConfigValidateOutput {
    fn to_human(&self) -> String {
        let mut lines = vec!["Configuration is valid.".to_string()];
        if !self.recalibrated.is_empty() {
            lines.push("Recalibrated thresholds:".to_string());
            for change in &self.recalibrated {
                lines.push(format!("  - {change}"));
            }
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ConfigArgs, config: Config, json_mode: bool) -> Result<()> {
    match args.command {
        ConfigCommands::Show => {
            let yaml = serde_yaml::to_string(&config).context("Failed to render configuration")?;
            output(&ConfigShowOutput { config, yaml }, json_mode);
        }
        ConfigCommands::Validate => {
            ConfigLoader::validate(&config)?;
            let recalibrated = ConfigLoader::warn_on_recalibration(&config);
            output(
                &ConfigValidateOutput {
                    valid: true,
                    recalibrated,
                },
                json_mode,
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_output_lists_recalibrations() {
        let mut config = Config::default();
        config.dedup.duplicate_threshold = 0.9;
        let out = ConfigValidateOutput {
            valid: true,
            recalibrated: ConfigLoader::warn_on_recalibration(&config),
        };
        assert!(out.to_human().contains("dedup.duplicate_threshold recalibrated from 0.85 to 0.9"));
    }

    #[test]
    fn test_show_renders_yaml_sections() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let out = ConfigShowOutput { config, yaml };
        let human = out.to_human();
        assert!(human.contains("dedup:"));
        assert!(human.contains("duplicate_threshold: 0.85"));
        assert_eq!(out.to_json()["sorting"]["default_strategy"], "balanced");
    }
}
