//! Subcommand implementations.
//!
//! Commands that work on a session read and write a JSON
//! [`SessionSnapshot`] file.

pub mod analyze;
pub mod config;
pub mod fingerprint;
pub mod sort;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::domain::models::Config;
use crate::infrastructure::config::{ConfigLoader, CONFIG_DIR};
use crate::services::SessionSnapshot;

/// Read a session file.
pub fn load_session(path: &Path) -> Result<SessionSnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse session file {}", path.display()))
}

/// Write a session file, replacing it atomically.
pub fn save_session(path: &Path, snapshot: &SessionSnapshot) -> Result<()> {
    let body = serde_json::to_string_pretty(snapshot).context("Failed to serialize session")?;
    let staging = path.with_extension("json.tmp");
    std::fs::write(&staging, body)
        .with_context(|| format!("Failed to write {}", staging.display()))?;
    std::fs::rename(&staging, path)
        .with_context(|| format!("Failed to replace session file {}", path.display()))
}

/// Load layered configuration from `dir` or the default directory.
pub fn load_config(dir: Option<&PathBuf>) -> Result<Config> {
    match dir {
        Some(dir) => ConfigLoader::load_from_dir(dir),
        None => ConfigLoader::load_from_dir(CONFIG_DIR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Reflection, SortStrategy, Task};

    #[test]
    fn test_session_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let snapshot = SessionSnapshot {
            outcome: "Increase payment conversion by 20%".to_string(),
            tasks: vec![Task::manual("pay", "Implement Apple Pay")],
            reflections: vec![Reflection::new("ignore documentation tasks")],
            strategy: SortStrategy::QuickWins,
            ..SessionSnapshot::default()
        };

        save_session(&path, &snapshot).unwrap();
        assert_eq!(load_session(&path).unwrap(), snapshot);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_minimal_session_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(
            &path,
            r#"{"outcome": "Grow", "tasks": [{"id": "a", "text": "Launch referral program"}]}"#,
        )
        .unwrap();

        let snapshot = load_session(&path).unwrap();
        assert_eq!(snapshot.tasks.len(), 1);
        assert!(snapshot.tasks[0].is_manual);
        assert!(snapshot.reflections.is_empty());
        assert_eq!(snapshot.strategy, SortStrategy::Balanced);
    }

    #[test]
    fn test_missing_session_file_has_context() {
        let err = load_session(Path::new("/nonexistent/session.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read session file"));
    }
}
