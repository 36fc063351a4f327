//! Domain layer for the task-intelligence pipeline
//!
//! Pure models, text utilities, error taxonomy and the port traits the
//! services depend on.

pub mod errors;
pub mod models;
pub mod ports;
pub mod text;

pub use errors::{DomainError, DomainResult, InferenceError};
