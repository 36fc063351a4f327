//! Guarded access to the inference provider.
//!
//! Every embedding and completion issued by the pipeline goes through here,
//! so each one is retried, throttled and timed out by the shared
//! [`RetryController`].

use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::domain::errors::InferenceError;
use crate::domain::ports::{InferenceProvider, Prompt, ResponseSchema};
use crate::services::retry_controller::{CallOutcome, RetryController};

pub struct InferenceClient {
    provider: Arc<dyn InferenceProvider>,
    retry: Arc<RetryController>,
}

impl InferenceClient {
    pub fn new(provider: Arc<dyn InferenceProvider>, retry: Arc<RetryController>) -> Self {
        Self { provider, retry }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn retry(&self) -> &RetryController {
        &self.retry
    }

    /// Embed `text`, retrying transient failures.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let provider = self.provider.as_ref();
        self.retry
            .execute("embed", move || async move {
                let vector = provider.embed(text).await?;
                if vector.is_empty() {
                    return Err(InferenceError::MalformedResponse("empty embedding".to_string()));
                }
                Ok(vector)
            })
            .await
    }

    /// Run a completion and deserialize it into `T` after schema validation.
    pub async fn complete<T: DeserializeOwned>(
        &self,
        operation: &str,
        prompt: &Prompt,
        schema: &ResponseSchema,
    ) -> Result<T, InferenceError> {
        let provider = self.provider.as_ref();
        self.retry
            .execute(operation, move || async move {
                let value = provider.complete(prompt, schema).await?;
                schema.validate(&value)?;
                serde_json::from_value(value).map_err(|e| {
                    InferenceError::MalformedResponse(format!("{}: {e}", schema.name))
                })
            })
            .await
    }

    /// [`InferenceClient::complete`], falling back to `fallback` once retries are spent.
    pub async fn complete_or_else<T, Fb>(
        &self,
        operation: &str,
        prompt: &Prompt,
        schema: &ResponseSchema,
        fallback: Fb,
    ) -> CallOutcome<T>
    where
        T: DeserializeOwned,
        Fb: FnOnce(&InferenceError) -> T,
    {
        let provider = self.provider.as_ref();
        self.retry
            .execute_or_fallback(
                operation,
                move || async move {
                    let value = provider.complete(prompt, schema).await?;
                    schema.validate(&value)?;
                    serde_json::from_value(value).map_err(|e| {
                        InferenceError::MalformedResponse(format!("{}: {e}", schema.name))
                    })
                },
                fallback,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::inference::{MockInferenceProvider, MockReply};
    use crate::services::retry_controller::RetryPolicy;
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Estimate {
        percentage: u8,
    }

    fn schema() -> ResponseSchema {
        ResponseSchema::new("coverage_estimate", vec!["percentage"], json!({}))
    }

    fn client(provider: Arc<MockInferenceProvider>) -> InferenceClient {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(2_000),
            max_backoff: Duration::from_millis(8_000),
            call_timeout: Duration::from_secs(5),
        };
        InferenceClient::new(provider, Arc::new(RetryController::new(policy, 2)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_retries_rate_limit_then_parses() {
        let provider = Arc::new(MockInferenceProvider::new());
        provider
            .push_reply("coverage_estimate", MockReply::Fail(InferenceError::RateLimited { retry_after: None }))
            .await;
        provider
            .push_reply("coverage_estimate", MockReply::Respond(json!({"percentage": 70})))
            .await;

        let estimate: Estimate = client(provider.clone())
            .complete("coverage", &Prompt::new("s", "u"), &schema())
            .await
            .unwrap();
        assert_eq!(estimate, Estimate { percentage: 70 });
        assert_eq!(provider.complete_calls(), 2);
    }

    #[tokio::test]
    async fn test_schema_violation_goes_straight_to_fallback() {
        let provider = Arc::new(MockInferenceProvider::new());
        provider
            .push_reply("coverage_estimate", MockReply::Respond(json!({"other": 1})))
            .await;

        let outcome = client(provider.clone())
            .complete_or_else("coverage", &Prompt::new("s", "u"), &schema(), |_| Estimate {
                percentage: 5,
            })
            .await;
        assert!(outcome.degraded);
        assert_eq!(outcome.value.percentage, 5);
        assert_eq!(provider.complete_calls(), 1);
    }
}
