use serde::{Deserialize, Serialize};

/// Main configuration structure for task-intel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Inference provider configuration
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Deduplication thresholds
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Coverage analysis bounds
    #[serde(default)]
    pub coverage: CoverageConfig,

    /// Quality tiers and rubric weights
    #[serde(default)]
    pub quality: QualityConfig,

    /// Draft generation limits
    #[serde(default)]
    pub drafts: DraftConfig,

    /// Reflection weighting
    #[serde(default)]
    pub reflections: ReflectionConfig,

    /// Sorting weights and default strategy
    #[serde(default)]
    pub sorting: SortingConfig,

    /// Interactive recalculation
    #[serde(default)]
    pub recalc: RecalcConfig,

    /// Record store backend
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Inference provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InferenceConfig {
    /// Provider: openai or mock
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat completion model
    #[serde(default = "default_completion_model")]
    pub completion_model: String,

    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// API key (falls back to OPENAI_API_KEY)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// HTTP client timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            completion_model: default_completion_model(),
            embedding_model: default_embedding_model(),
            api_key: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Requests per second allowed
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Burst size for token bucket
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// Concurrent in-flight requests allowed against the provider
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

const fn default_requests_per_second() -> f64 {
    10.0
}

const fn default_burst_size() -> u32 {
    20
}

const fn default_max_concurrent_requests() -> usize {
    4
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total attempts per call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Upper bound on a single attempt in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    2_000
}

const fn default_max_backoff_ms() -> u64 {
    8_000
}

const fn default_call_timeout_ms() -> u64 {
    15_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

/// Deduplication thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DedupConfig {
    /// Similarity at or above which a draft is a duplicate
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f64,

    /// Lower edge of the borderline audit band
    #[serde(default = "default_borderline_threshold")]
    pub borderline_threshold: f64,
}

pub(crate) const fn default_duplicate_threshold() -> f64 {
    0.85
}

pub(crate) const fn default_borderline_threshold() -> f64 {
    0.80
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: default_duplicate_threshold(),
            borderline_threshold: default_borderline_threshold(),
        }
    }
}

/// Coverage analysis bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoverageConfig {
    /// Below this many tasks the result is flagged low-confidence
    #[serde(default = "default_min_tasks")]
    pub min_tasks: usize,

    /// Above this many tasks only the top-N by priority are considered
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,

    /// Coverage under this percentage triggers draft generation
    #[serde(default = "default_gap_threshold")]
    pub gap_threshold: u8,
}

const fn default_min_tasks() -> usize {
    5
}

const fn default_max_tasks() -> usize {
    50
}

const fn default_gap_threshold() -> u8 {
    80
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            min_tasks: default_min_tasks(),
            max_tasks: default_max_tasks(),
            gap_threshold: default_gap_threshold(),
        }
    }
}

/// Quality tiers and rubric weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QualityConfig {
    /// Scores at or above this are excellent
    #[serde(default = "default_excellent_cutoff")]
    pub excellent_cutoff: u8,

    /// Scores at or above this (and under excellent) are good
    #[serde(default = "default_good_cutoff")]
    pub good_cutoff: u8,

    #[serde(default = "default_rubric_weight")]
    pub clarity_weight: f64,

    #[serde(default = "default_rubric_weight")]
    pub specificity_weight: f64,

    #[serde(default = "default_rubric_weight")]
    pub actionability_weight: f64,

    #[serde(default = "default_rubric_weight")]
    pub alignment_weight: f64,

    /// Tasks evaluated together in one chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunks evaluated concurrently
    #[serde(default = "default_parallel_chunks")]
    pub parallel_chunks: usize,
}

pub(crate) const fn default_excellent_cutoff() -> u8 {
    80
}

pub(crate) const fn default_good_cutoff() -> u8 {
    50
}

const fn default_rubric_weight() -> f64 {
    1.0
}

const fn default_chunk_size() -> usize {
    4
}

const fn default_parallel_chunks() -> usize {
    2
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            excellent_cutoff: default_excellent_cutoff(),
            good_cutoff: default_good_cutoff(),
            clarity_weight: default_rubric_weight(),
            specificity_weight: default_rubric_weight(),
            actionability_weight: default_rubric_weight(),
            alignment_weight: default_rubric_weight(),
            chunk_size: default_chunk_size(),
            parallel_chunks: default_parallel_chunks(),
        }
    }
}

/// Draft generation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DraftConfig {
    /// Maximum drafts requested per generation
    #[serde(default = "default_max_drafts")]
    pub max_drafts: usize,

    /// Existing tasks included in the generation prompt summary
    #[serde(default = "default_summary_task_limit")]
    pub summary_task_limit: usize,
}

const fn default_max_drafts() -> usize {
    5
}

const fn default_summary_task_limit() -> usize {
    20
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            max_drafts: default_max_drafts(),
            summary_task_limit: default_summary_task_limit(),
        }
    }
}

/// Reflection weighting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReflectionConfig {
    /// Hours for a reflection's weight to halve
    #[serde(default = "default_half_life_hours")]
    pub half_life_hours: f64,

    /// Most recent active reflections considered per pass
    #[serde(default = "default_max_reflections")]
    pub max_reflections: usize,

    /// Combined-priority points added to tasks matching a focus directive
    #[serde(default = "default_inclusion_boost")]
    pub inclusion_boost: f64,
}

const fn default_half_life_hours() -> f64 {
    168.0
}

const fn default_max_reflections() -> usize {
    10
}

const fn default_inclusion_boost() -> f64 {
    15.0
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            half_life_hours: default_half_life_hours(),
            max_reflections: default_max_reflections(),
            inclusion_boost: default_inclusion_boost(),
        }
    }
}

/// Sorting weights and default strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SortingConfig {
    /// Strategy used when the caller does not pick one
    #[serde(default = "default_strategy")]
    pub default_strategy: String,

    /// Weight of strategic priority in the balanced score
    #[serde(default = "default_priority_weight")]
    pub priority_weight: f64,

    /// Weight of quality score in the balanced score
    #[serde(default = "default_quality_weight")]
    pub quality_weight: f64,
}

fn default_strategy() -> String {
    "balanced".to_string()
}

const fn default_priority_weight() -> f64 {
    0.6
}

const fn default_quality_weight() -> f64 {
    0.4
}

impl Default for SortingConfig {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
            priority_weight: default_priority_weight(),
            quality_weight: default_quality_weight(),
        }
    }
}

/// Interactive recalculation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RecalcConfig {
    /// Debounce window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

const fn default_debounce_ms() -> u64 {
    300
}

impl Default for RecalcConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Record store backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    /// Backend: memory or sqlite
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Pooled `SQLite` connections; plan writes are serialized by the session
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_database_path() -> String {
    ".task-intel/task-intel.db".to_string()
}

const fn default_max_connections() -> u32 {
    4
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}
