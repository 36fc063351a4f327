//! Port trait definitions (Hexagonal Architecture)
//!
//! - InferenceProvider: embeddings and schema-constrained completions
//! - RecordStore: read-by-id, write-replace and audit append
//!
//! Adapters in `crate::adapters` implement these; services depend only on
//! the traits.

pub mod inference;
pub mod record_store;

pub use inference::{InferenceProvider, Prompt, ResponseSchema};
pub use record_store::{read_typed, write_typed, RecordKind, RecordStore};
