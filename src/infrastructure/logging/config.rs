use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::models::LoggingConfig;

/// Resolved logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for the console layer (json, pretty)
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for log files (optional, if None logs only to stderr)
    pub log_dir: Option<PathBuf>,

    /// Log rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}

impl LogConfig {
    /// Build from the `logging` section of the loaded configuration.
    ///
    /// Values were validated by the loader; anything unrecognised falls back
    /// to the default variant.
    pub fn from_settings(settings: &LoggingConfig) -> Self {
        let format = match settings.format.as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        let rotation = match settings.rotation.as_str() {
            "hourly" => RotationPolicy::Hourly,
            "never" => RotationPolicy::Never,
            _ => RotationPolicy::Daily,
        };
        Self {
            level: settings.level.clone(),
            format,
            log_dir: settings.log_dir.as_ref().map(PathBuf::from),
            rotation,
        }
    }

    /// Override the level, e.g. from a `--verbose` flag.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
