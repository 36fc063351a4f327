//! Inference provider port.
//!
//! The pipeline consumes two capabilities: text embeddings and
//! schema-constrained completions. Providers report failures with the three
//! [`InferenceError`] kinds only; everything else is an adapter concern.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::InferenceError;

/// A completion prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Shape a completion result must have.
///
/// `json_schema` is forwarded to providers that support structured output;
/// `required` is checked locally regardless of provider support.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub required: Vec<&'static str>,
    pub json_schema: Value,
}

impl ResponseSchema {
    pub fn new(name: &'static str, required: Vec<&'static str>, json_schema: Value) -> Self {
        Self {
            name,
            required,
            json_schema,
        }
    }

    /// Reject anything that is not an object carrying every required key.
    pub fn validate(&self, value: &Value) -> Result<(), InferenceError> {
        let object = value.as_object().ok_or_else(|| {
            InferenceError::MalformedResponse(format!("{}: expected a JSON object", self.name))
        })?;

        let missing: Vec<&str> = self
            .required
            .iter()
            .copied()
            .filter(|key| object.get(*key).is_none_or(Value::is_null))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(InferenceError::MalformedResponse(format!(
                "{}: missing required fields {}",
                self.name,
                missing.join(", ")
            )))
        }
    }
}

/// External inference capability.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Provider name for diagnostics (e.g., "openai", "mock").
    fn name(&self) -> &'static str;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError>;

    /// Run a completion whose result should match `schema`.
    async fn complete(&self, prompt: &Prompt, schema: &ResponseSchema) -> Result<Value, InferenceError>;
}
