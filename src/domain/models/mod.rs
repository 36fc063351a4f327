pub mod audit;
pub mod config;
pub mod coverage;
pub mod draft;
pub mod plan;
pub mod reflection;
pub mod task;

pub use audit::{AuditEntry, AuditKind, AuditRecord};
pub use config::{
    Config, CoverageConfig, DedupConfig, DraftConfig, InferenceConfig, LoggingConfig,
    QualityConfig, RateLimitConfig, RecalcConfig, ReflectionConfig, RetryConfig, SortingConfig,
    StorageConfig,
};
pub use coverage::{CoverageFacet, CoverageResult};
pub use draft::{DedupDecision, DraftStatus, DraftTask, SuppressedDraft, SuppressionReason};
pub use plan::{
    Exclusion, PriorityPlan, RecalcOutcome, RecalcStatus, RecalcTrigger, SortStrategy,
};
pub use reflection::{DirectiveKind, Reflection, ReflectionDirective};
pub use task::{QualityBadge, QualityTier, StrategicScore, Task, TaskSource};
