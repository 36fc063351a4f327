//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides
//! - Configuration validation
//! - Warnings when scoring thresholds are recalibrated

pub mod loader;

pub use loader::{CONFIG_DIR, ConfigError, ConfigLoader, ENV_PREFIX};
