//! OpenAI-compatible inference provider.
//!
//! Embeddings go to `POST {base_url}/embeddings`; completions go to
//! `POST {base_url}/chat/completions` with a `json_schema` response format.
//! Works against any server speaking the same API (Azure OpenAI, local
//! gateways).

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult, InferenceError};
use crate::domain::models::InferenceConfig;
use crate::domain::ports::{InferenceProvider, Prompt, ResponseSchema};

/// Configuration for the OpenAI provider.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key. Falls back to `OPENAI_API_KEY` env var.
    pub api_key: Option<String>,
    /// Base URL for the API. Default: `https://api.openai.com/v1`.
    pub base_url: String,
    pub completion_model: String,
    pub embedding_model: String,
    /// HTTP client timeout. The retry controller applies its own per-call bound on top.
    pub request_timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self::from(&InferenceConfig::default())
    }
}

impl From<&InferenceConfig> for OpenAiConfig {
    fn from(config: &InferenceConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            completion_model: config.completion_model.clone(),
            embedding_model: config.embedding_model.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

impl OpenAiConfig {
    fn resolve_api_key(&self) -> DomainResult<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                DomainError::ValidationFailed(
                    "OpenAI API key not set. Set OPENAI_API_KEY or inference.api_key.".to_string(),
                )
            })
    }
}

/// OpenAI-compatible provider.
pub struct OpenAiInferenceProvider {
    config: OpenAiConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiInferenceProvider {
    pub fn new(config: OpenAiConfig) -> DomainResult<Self> {
        let api_key = config.resolve_api_key()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DomainError::ValidationFailed(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<Value, InferenceError> {
        let url = format!("{}/{path}", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(classify_status(status, retry_after, self.config.request_timeout, &body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| InferenceError::MalformedResponse(format!("invalid JSON body: {e}")))
    }

    /// Transport failures count as timeouts: the call did not complete and may be retried.
    fn transport_error(&self, err: &reqwest::Error) -> InferenceError {
        debug!(error = %err, timeout = err.is_timeout(), "Inference transport failure");
        InferenceError::Timeout(self.config.request_timeout)
    }
}

/// Map a non-success HTTP status onto the three inference failure kinds.
///
/// 408 and 504 are timeouts of the configured budget. 429 and every other
/// 5xx are provider overload, honouring `Retry-After` when present.
fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    request_timeout: Duration,
    body: &str,
) -> InferenceError {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            InferenceError::Timeout(request_timeout)
        }
        s if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => {
            InferenceError::RateLimited { retry_after }
        }
        s => InferenceError::MalformedResponse(format!("provider returned {s}: {body}")),
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let seconds: f64 = raw.parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}

#[async_trait]
impl InferenceProvider for OpenAiInferenceProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let request = EmbeddingsRequest {
            model: &self.config.embedding_model,
            input: vec![text],
        };
        let body = self.post("embeddings", &request).await?;
        let parsed: EmbeddingsResponse = serde_json::from_value(body)
            .map_err(|e| InferenceError::MalformedResponse(format!("embedding response: {e}")))?;

        parsed
            .data
            .into_iter()
            .min_by_key(|d| d.index)
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| InferenceError::MalformedResponse("empty embedding response".to_string()))
    }

    async fn complete(&self, prompt: &Prompt, schema: &ResponseSchema) -> Result<Value, InferenceError> {
        let request = json!({
            "model": self.config.completion_model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.json_schema,
                },
            },
        });

        let body = self.post("chat/completions", &request).await?;
        let parsed: ChatResponse = serde_json::from_value(body)
            .map_err(|e| InferenceError::MalformedResponse(format!("completion response: {e}")))?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| InferenceError::MalformedResponse("no choices returned".to_string()))?;

        if let Some(refusal) = message.refusal {
            return Err(InferenceError::MalformedResponse(format!("model refused: {refusal}")));
        }

        let content = message
            .content
            .ok_or_else(|| InferenceError::MalformedResponse("empty message content".to_string()))?;

        let value: Value = serde_json::from_str(&content)
            .map_err(|e| InferenceError::MalformedResponse(format!("content is not JSON: {e}")))?;
        schema.validate(&value)?;
        Ok(value)
    }
}

// -- OpenAI API request/response types --

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}
