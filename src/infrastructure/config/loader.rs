use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

use crate::domain::models::config::{
    Config, default_borderline_threshold, default_duplicate_threshold, default_excellent_cutoff,
    default_good_cutoff,
};
use crate::domain::models::SortStrategy;

/// Project-local configuration directory
pub const CONFIG_DIR: &str = ".task-intel";

/// Environment variable prefix; `__` separates nested keys
pub const ENV_PREFIX: &str = "TASK_INTEL_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid inference provider: {0}. Must be one of: openai, mock")]
    InvalidProvider(String),

    #[error("Invalid storage backend: {0}. Must be one of: memory, sqlite")]
    InvalidBackend(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(f64),

    #[error("Invalid burst_size: {0}. Must be at least 1")]
    InvalidBurstSize(u32),

    #[error("Invalid max_concurrent_requests: {0}. Must be at least 1")]
    InvalidConcurrency(usize),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid threshold {name}: {value}. Must be within [0, 1]")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error(
        "Invalid dedup band: borderline_threshold ({0}) must not exceed duplicate_threshold ({1})"
    )]
    InvalidBorderlineBand(f64, f64),

    #[error("Invalid quality cutoffs: good_cutoff ({0}) must be below excellent_cutoff ({1})")]
    InvalidQualityCutoffs(u8, u8),

    #[error("Unknown sort strategy: {0}")]
    UnknownStrategy(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .task-intel/config.yaml
    /// 3. .task-intel/local.yaml (optional overrides)
    /// 4. Environment variables (TASK_INTEL_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(CONFIG_DIR)
    }

    /// Same layering as [`ConfigLoader::load`], rooted at `dir`.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Self::warn_on_recalibration(&config);
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Self::warn_on_recalibration(&config);
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        // Logging
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        // Inference and storage backends
        if !["openai", "mock"].contains(&config.inference.provider.as_str()) {
            return Err(ConfigError::InvalidProvider(config.inference.provider.clone()));
        }

        if !["memory", "sqlite"].contains(&config.storage.backend.as_str()) {
            return Err(ConfigError::InvalidBackend(config.storage.backend.clone()));
        }

        if config.storage.backend == "sqlite" && config.storage.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        // Rate limit
        if config.rate_limit.requests_per_second <= 0.0 {
            return Err(ConfigError::InvalidRateLimit(
                config.rate_limit.requests_per_second,
            ));
        }

        if config.rate_limit.burst_size == 0 {
            return Err(ConfigError::InvalidBurstSize(config.rate_limit.burst_size));
        }

        if config.rate_limit.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidConcurrency(
                config.rate_limit.max_concurrent_requests,
            ));
        }

        // Retry
        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }

        if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        if config.retry.call_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "retry.call_timeout_ms must be positive".to_string(),
            ));
        }

        // Dedup thresholds
        for (name, value) in [
            ("duplicate_threshold", config.dedup.duplicate_threshold),
            ("borderline_threshold", config.dedup.borderline_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        if config.dedup.borderline_threshold > config.dedup.duplicate_threshold {
            return Err(ConfigError::InvalidBorderlineBand(
                config.dedup.borderline_threshold,
                config.dedup.duplicate_threshold,
            ));
        }

        // Quality tiers
        if config.quality.good_cutoff >= config.quality.excellent_cutoff
            || config.quality.excellent_cutoff > 100
        {
            return Err(ConfigError::InvalidQualityCutoffs(
                config.quality.good_cutoff,
                config.quality.excellent_cutoff,
            ));
        }

        if config.quality.chunk_size == 0 || config.quality.parallel_chunks == 0 {
            return Err(ConfigError::ValidationFailed(
                "quality.chunk_size and quality.parallel_chunks must be at least 1".to_string(),
            ));
        }

        // Coverage bounds
        if config.coverage.max_tasks == 0 || config.coverage.min_tasks > config.coverage.max_tasks
        {
            return Err(ConfigError::ValidationFailed(format!(
                "coverage.min_tasks ({}) must not exceed coverage.max_tasks ({}), which must be positive",
                config.coverage.min_tasks, config.coverage.max_tasks
            )));
        }

        if config.coverage.gap_threshold > 100 {
            return Err(ConfigError::ValidationFailed(format!(
                "coverage.gap_threshold ({}) must be a percentage",
                config.coverage.gap_threshold
            )));
        }

        // Sorting
        SortStrategy::from_str(&config.sorting.default_strategy)
            .map_err(|_| ConfigError::UnknownStrategy(config.sorting.default_strategy.clone()))?;

        Ok(())
    }

    /// Warn about tuning values that differ from the calibrated defaults.
    ///
    /// Returns the messages so callers and tests can inspect them.
    pub fn warn_on_recalibration(config: &Config) -> Vec<String> {
        let mut changes = Vec::new();

        if (config.dedup.duplicate_threshold - default_duplicate_threshold()).abs() > f64::EPSILON
        {
            changes.push(format!(
                "dedup.duplicate_threshold recalibrated from {} to {}",
                default_duplicate_threshold(),
                config.dedup.duplicate_threshold
            ));
        }
        if (config.dedup.borderline_threshold - default_borderline_threshold()).abs()
            > f64::EPSILON
        {
            changes.push(format!(
                "dedup.borderline_threshold recalibrated from {} to {}",
                default_borderline_threshold(),
                config.dedup.borderline_threshold
            ));
        }
        if config.quality.excellent_cutoff != default_excellent_cutoff() {
            changes.push(format!(
                "quality.excellent_cutoff recalibrated from {} to {}",
                default_excellent_cutoff(),
                config.quality.excellent_cutoff
            ));
        }
        if config.quality.good_cutoff != default_good_cutoff() {
            changes.push(format!(
                "quality.good_cutoff recalibrated from {} to {}",
                default_good_cutoff(),
                config.quality.good_cutoff
            ));
        }

        for change in &changes {
            warn!(change = %change, "Scoring threshold differs from default");
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!((config.rate_limit.requests_per_second - 10.0).abs() < f64::EPSILON);
        assert!((config.dedup.duplicate_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.quality.excellent_cutoff, 80);
        assert_eq!(config.quality.good_cutoff, 50);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.recalc.debounce_ms, 300);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
        assert!(ConfigLoader::warn_on_recalibration(&config).is_empty());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
rate_limit:
  requests_per_second: 15.0
  burst_size: 30
dedup:
  duplicate_threshold: 0.9
quality:
  excellent_cutoff: 85
storage:
  backend: sqlite
  path: /custom/path.db
logging:
  level: debug
  format: json
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert!((config.rate_limit.requests_per_second - 15.0).abs() < f64::EPSILON);
        assert_eq!(config.rate_limit.burst_size, 30);
        assert!((config.dedup.duplicate_threshold - 0.9).abs() < f64::EPSILON);
        assert!((config.dedup.borderline_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.quality.excellent_cutoff, 85);
        assert_eq!(config.storage.path, "/custom/path.db");
        assert_eq!(config.logging.format, "json");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
        let changes = ConfigLoader::warn_on_recalibration(&config);
        assert_eq!(changes.len(), 2);
        assert!(changes[0].contains("duplicate_threshold"));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_validate_zero_rate_limit() {
        let mut config = Config::default();
        config.rate_limit.requests_per_second = 0.0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidRateLimit(_)
        ));
    }

    #[test]
    fn test_validate_zero_attempts() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxAttempts(0)
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.retry.initial_backoff_ms = 30_000;
        config.retry.max_backoff_ms = 10_000;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBackoff(30_000, 10_000)
        ));
    }

    #[test]
    fn test_validate_threshold_out_of_range() {
        let mut config = Config::default();
        config.dedup.duplicate_threshold = 1.5;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidThreshold {
                name: "duplicate_threshold",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_borderline_above_duplicate() {
        let mut config = Config::default();
        config.dedup.borderline_threshold = 0.9;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBorderlineBand(_, _)
        ));
    }

    #[test]
    fn test_validate_inverted_quality_cutoffs() {
        let mut config = Config::default();
        config.quality.good_cutoff = 80;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidQualityCutoffs(80, 80)
        ));
    }

    #[test]
    fn test_validate_unknown_strategy_and_backend() {
        let mut config = Config::default();
        config.sorting.default_strategy = "alphabetical".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::UnknownStrategy(_)
        ));

        let mut config = Config::default();
        config.storage.backend = "postgres".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBackend(_)
        ));
    }

    #[test]
    fn test_env_override() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "logging:\n  level: warn\n").unwrap();

        temp_env::with_vars(
            [
                ("TASK_INTEL_LOGGING__LEVEL", Some("debug")),
                ("TASK_INTEL_DEDUP__DUPLICATE_THRESHOLD", Some("0.88")),
                ("TASK_INTEL_RECALC__DEBOUNCE_MS", Some("500")),
            ],
            || {
                let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
                assert_eq!(config.logging.level, "debug", "Env should beat YAML");
                assert!((config.dedup.duplicate_threshold - 0.88).abs() < f64::EPSILON);
                assert_eq!(config.recalc.debounce_ms, 500);
            },
        );
    }

    #[test]
    fn test_env_override_rejected_when_invalid() {
        let dir = TempDir::new().unwrap();
        temp_env::with_var("TASK_INTEL_DEDUP__DUPLICATE_THRESHOLD", Some("2.0"), || {
            assert!(ConfigLoader::load_from_dir(dir.path()).is_err());
        });
    }

    #[test]
    fn test_hierarchical_merging() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "logging:\n  level: info\n  format: json\nstorage:\n  backend: sqlite\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("local.yaml"), "logging:\n  level: debug\n").unwrap();

        let config = ConfigLoader::load_from_dir(dir.path()).unwrap();

        assert_eq!(
            config.logging.level, "debug",
            "Override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
        assert_eq!(config.storage.backend, "sqlite");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sorting:\n  default_strategy: quick-wins").unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.sorting.default_strategy, "quick-wins");
    }
}
