//! Composition root.
//!
//! Builds the provider, store, retry controller and pipeline from a
//! validated [`Config`] and hands out sessions and recalculation
//! controllers over them.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::adapters::{build_inference_provider, build_record_store};
use crate::domain::errors::DomainResult;
use crate::domain::models::Config;
use crate::domain::ports::{InferenceProvider, RecordStore};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{
    AnalysisPipeline, AuditLog, InferenceClient, PlanningSession, RecalculationController,
    RetryController, SessionSnapshot,
};

pub struct AppContext {
    pub config: Config,
    pub provider: Arc<dyn InferenceProvider>,
    pub store: Arc<dyn RecordStore>,
    pub audit: Arc<AuditLog>,
    pub pipeline: Arc<AnalysisPipeline>,
}

impl AppContext {
    /// Build every collaborator named by `config`.
    pub async fn from_config(config: Config) -> DomainResult<Self> {
        ConfigLoader::warn_on_recalibration(&config);
        let provider = build_inference_provider(&config.inference)?;
        let store = build_record_store(&config.storage).await?;
        info!(
            provider = provider.name(),
            storage = %config.storage.backend,
            "Task intelligence context ready"
        );
        Ok(Self::with_parts(config, provider, store))
    }

    /// Build around an explicit provider and store.
    pub fn with_parts(
        config: Config,
        provider: Arc<dyn InferenceProvider>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let retry = Arc::new(RetryController::from_config(&config.retry, &config.rate_limit));
        let client = Arc::new(InferenceClient::new(Arc::clone(&provider), retry));
        let audit = Arc::new(AuditLog::with_store(Arc::clone(&store)));
        let pipeline = Arc::new(AnalysisPipeline::from_config(&config, client, Arc::clone(&audit)));
        Self {
            config,
            provider,
            store,
            audit,
            pipeline,
        }
    }

    pub fn open_session(&self, snapshot: SessionSnapshot) -> Arc<PlanningSession> {
        Arc::new(PlanningSession::new(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.store),
            snapshot,
        ))
    }

    /// Debounced recalculation over `session`, using the configured window.
    pub fn spawn_controller(&self, session: Arc<PlanningSession>) -> RecalculationController {
        RecalculationController::spawn(session, Duration::from_millis(self.config.recalc.debounce_ms))
    }
}
