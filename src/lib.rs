//! task-intel - task intelligence pipeline
//!
//! Measures a task list against a stated outcome and keeps it useful:
//! coverage estimation, gap-filling draft generation, duplicate
//! suppression, quality scoring, reflection steering and strategy-based
//! ordering, recomputed under a debounced single-flight controller.
//!
//! # Architecture
//!
//! The crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, text utilities, errors and ports
//! - **Adapters** (`adapters`): inference providers and record stores
//! - **Service Layer** (`services`): the pipeline components and the session
//! - **Application Layer** (`application`): composition root
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use task_intel::{AppContext, ConfigLoader, SessionSnapshot};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let context = AppContext::from_config(ConfigLoader::load()?).await?;
//!     let session = context.open_session(SessionSnapshot::default());
//!     let controller = context.spawn_controller(session);
//!     controller.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::AppContext;
pub use domain::errors::{DomainError, DomainResult, InferenceError};
pub use domain::models::{
    Config, CoverageResult, DraftTask, PriorityPlan, QualityTier, RecalcTrigger, Reflection,
    SortStrategy, StrategicScore, Task,
};
pub use domain::ports::{InferenceProvider, RecordStore};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    AnalysisPipeline, PlanningSession, RecalcState, RecalculationController, SessionSnapshot,
    SortingEngine,
};
