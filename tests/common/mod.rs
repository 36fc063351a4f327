//! Common test utilities for integration tests
//!
//! Builds offline pipelines over the mock provider and the in-memory store.

#![allow(dead_code)]

use std::sync::Arc;

use task_intel::adapters::{InMemoryRecordStore, MockInferenceProvider};
use task_intel::domain::models::{Config, Reflection, Task};
use task_intel::services::SessionSnapshot;
use task_intel::AppContext;

/// Configuration that never leaves the process.
pub fn offline_config() -> Config {
    let mut config = Config::default();
    config.inference.provider = "mock".to_string();
    config.storage.backend = "memory".to_string();
    config
}

/// Context over an explicit mock provider and store, so tests can script
/// replies and inject store failures.
pub fn mock_context(
    provider: Arc<MockInferenceProvider>,
    store: Arc<InMemoryRecordStore>,
) -> AppContext {
    AppContext::with_parts(offline_config(), provider, store)
}

/// Unit vector in 3 dimensions whose cosine with `[1, 0, 0]` is `cosine`.
/// `axis` (1 or 2) picks the orthogonal component so two such vectors stay
/// apart from each other.
pub fn unit_with_cosine(cosine: f32, axis: usize) -> Vec<f32> {
    let mut vector = vec![cosine, 0.0, 0.0];
    vector[axis] = (1.0 - cosine * cosine).sqrt();
    vector
}

/// The payment-conversion session used across scenarios.
pub fn payment_session() -> SessionSnapshot {
    SessionSnapshot {
        outcome: "Increase payment conversion by 20%".to_string(),
        tasks: vec![
            Task::manual("docs", "Update API docs"),
            Task::manual("pay", "Implement Apple Pay"),
        ],
        reflections: vec![Reflection::new("ignore documentation tasks")],
        ..SessionSnapshot::default()
    }
}

/// Setup test logging
///
/// Call at the beginning of tests that need logging output.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
