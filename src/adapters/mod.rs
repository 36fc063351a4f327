//! Adapters implementing the domain ports.
//!
//! - inference: OpenAI-compatible HTTP provider and a deterministic mock
//! - memory_store / sqlite: record store backends

pub mod inference;
pub mod memory_store;
pub mod sqlite;

pub use inference::{MockInferenceProvider, MockReply, OpenAiConfig, OpenAiInferenceProvider};
pub use memory_store::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{InferenceConfig, StorageConfig};
use crate::domain::ports::{InferenceProvider, RecordStore};

/// Build the configured record store backend.
pub async fn build_record_store(config: &StorageConfig) -> DomainResult<Arc<dyn RecordStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryRecordStore::new())),
        "sqlite" => {
            let store = sqlite::open_record_store_with(&config.path, sqlite::PoolConfig::from(config))
                .await
                .map_err(|e| DomainError::PersistenceUnavailable(e.to_string()))?;
            Ok(Arc::new(store))
        }
        other => Err(DomainError::ValidationFailed(format!(
            "unknown storage backend: {other}"
        ))),
    }
}

/// Build the configured inference provider.
pub fn build_inference_provider(config: &InferenceConfig) -> DomainResult<Arc<dyn InferenceProvider>> {
    match config.provider.as_str() {
        "mock" => Ok(Arc::new(MockInferenceProvider::new())),
        "openai" => Ok(Arc::new(OpenAiInferenceProvider::new(OpenAiConfig::from(config))?)),
        other => Err(DomainError::ValidationFailed(format!(
            "unknown inference provider: {other}"
        ))),
    }
}
