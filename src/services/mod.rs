//! Service layer: the pipeline components and the session that drives them.

pub mod audit_log;
pub mod coverage_analyzer;
pub mod deduplication;
pub mod draft_generator;
pub mod inference_client;
pub mod pipeline;
pub mod planning_session;
pub mod quality_evaluator;
pub mod recalculation;
pub mod reflection_interpreter;
pub mod retry_controller;
pub mod similarity;
pub mod sorting_engine;

pub use audit_log::{AuditLog, AuditLogConfig};
pub use coverage_analyzer::CoverageAnalyzer;
pub use deduplication::{DedupOutcome, DedupThresholds, DeduplicationService};
pub use draft_generator::{DraftContext, DraftGenerator, GenerationOutcome};
pub use inference_client::InferenceClient;
pub use pipeline::{AnalysisInput, AnalysisPipeline, AnalysisResult};
pub use planning_session::{DraftBatchOutcome, PlanningSession, SessionSnapshot};
pub use quality_evaluator::{QualityAssessment, QualityEvaluator, QualityPass, RubricScores};
pub use recalculation::{RecalcState, RecalculationController, Recalculator};
pub use reflection_interpreter::{apply_directives, DirectiveApplication, ReflectionInterpreter};
pub use retry_controller::{CallOutcome, RetryController, RetryPolicy};
pub use similarity::{cosine_similarity, fingerprint, SimilarityEngine, SimilarityScore};
pub use sorting_engine::SortingEngine;
