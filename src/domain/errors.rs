//! Domain errors for the task-intelligence pipeline.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failure kinds reported by the inference boundary.
///
/// These never escape the pipeline as hard failures: the retry controller
/// retries the transient ones and then hands control to a heuristic fallback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InferenceError {
    #[error("Inference call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Inference provider rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Malformed inference response: {0}")]
    MalformedResponse(String),
}

impl InferenceError {
    /// Timeouts and rate limits are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RateLimited { .. })
    }

    /// Server-advised delay, if the provider sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Domain-level errors surfaced to callers of the session boundary.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Draft not found: {0}")]
    DraftNotFound(Uuid),

    #[error("Reflection not found: {0}")]
    ReflectionNotFound(Uuid),

    #[error("Unknown sort strategy: {0}")]
    UnknownStrategy(String),

    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomainError {
    /// Whether the caller should be offered a retry affordance.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistenceUnavailable(_))
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::PersistenceUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
