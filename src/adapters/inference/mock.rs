//! Deterministic inference provider for tests and offline runs.
//!
//! Embeddings are a normalized hashed bag of stemmed keywords, so texts that
//! share vocabulary land close together. Completions are scripted per
//! response-schema name; an unscripted completion fails as malformed, which
//! sends callers down their heuristic fallback.

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::errors::InferenceError;
use crate::domain::ports::{InferenceProvider, Prompt, ResponseSchema};
use crate::domain::text;

/// Default embedding width.
pub const MOCK_EMBEDDING_DIMENSION: usize = 256;

/// One scripted completion reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(Value),
    Fail(InferenceError),
}

/// Mock inference provider.
pub struct MockInferenceProvider {
    dimension: usize,
    latency: Option<Duration>,
    embedding_overrides: Arc<RwLock<HashMap<String, Vec<f32>>>>,
    embed_failures: Arc<RwLock<VecDeque<InferenceError>>>,
    embed_outage: Arc<RwLock<Option<InferenceError>>>,
    scripted: Arc<RwLock<HashMap<String, VecDeque<MockReply>>>>,
    standing: Arc<RwLock<HashMap<String, MockReply>>>,
    prompts: Arc<RwLock<Vec<(String, Prompt)>>>,
    embed_calls: AtomicUsize,
    complete_calls: AtomicUsize,
}

impl MockInferenceProvider {
    pub fn new() -> Self {
        Self {
            dimension: MOCK_EMBEDDING_DIMENSION,
            latency: None,
            embedding_overrides: Arc::new(RwLock::new(HashMap::new())),
            embed_failures: Arc::new(RwLock::new(VecDeque::new())),
            embed_outage: Arc::new(RwLock::new(None)),
            scripted: Arc::new(RwLock::new(HashMap::new())),
            standing: Arc::new(RwLock::new(HashMap::new())),
            prompts: Arc::new(RwLock::new(Vec::new())),
            embed_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Pin the embedding returned for `text` (matched by fingerprint).
    pub async fn set_embedding(&self, text: &str, vector: Vec<f32>) {
        let mut overrides = self.embedding_overrides.write().await;
        overrides.insert(text::fingerprint(text), vector);
    }

    /// Fail the next embed call with `error`. Queued failures are consumed in order.
    pub async fn queue_embed_failure(&self, error: InferenceError) {
        self.embed_failures.write().await.push_back(error);
    }

    /// Fail every embed call until cleared with `None`.
    pub async fn set_embed_outage(&self, error: Option<InferenceError>) {
        *self.embed_outage.write().await = error;
    }

    /// Queue a one-shot reply for completions using `schema_name`.
    pub async fn push_reply(&self, schema_name: &str, reply: MockReply) {
        let mut scripted = self.scripted.write().await;
        scripted
            .entry(schema_name.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Reply used for `schema_name` whenever no one-shot reply is queued.
    pub async fn set_standing_reply(&self, schema_name: &str, reply: MockReply) {
        let mut standing = self.standing.write().await;
        standing.insert(schema_name.to_string(), reply);
    }

    /// Prompts received for `schema_name`, oldest first.
    pub async fn prompts_for(&self, schema_name: &str) -> Vec<Prompt> {
        let prompts = self.prompts.read().await;
        prompts
            .iter()
            .filter(|(name, _)| name == schema_name)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    /// The deterministic embedding used when no override is set.
    pub fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
        let width = dimension.max(1);
        let mut vector = vec![0.0_f32; width];
        for keyword in text::keywords(text) {
            let digest = Sha256::digest(keyword.as_bytes());
            let bucket = (usize::from(digest[0]) << 8) | usize::from(digest[1]);
            vector[bucket % width] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MockInferenceProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceProvider for MockInferenceProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn embed(&self, input: &str) -> Result<Vec<f32>, InferenceError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(error) = self.embed_outage.read().await.clone() {
            return Err(error);
        }
        if let Some(error) = self.embed_failures.write().await.pop_front() {
            return Err(error);
        }

        let overrides = self.embedding_overrides.read().await;
        Ok(overrides
            .get(&text::fingerprint(input))
            .cloned()
            .unwrap_or_else(|| Self::hashed_embedding(input, self.dimension)))
    }

    async fn complete(&self, prompt: &Prompt, schema: &ResponseSchema) -> Result<Value, InferenceError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .write()
            .await
            .push((schema.name.to_string(), prompt.clone()));
        self.simulate_latency().await;

        let queued = self
            .scripted
            .write()
            .await
            .get_mut(schema.name)
            .and_then(VecDeque::pop_front);
        let reply = match queued {
            Some(reply) => Some(reply),
            None => self.standing.read().await.get(schema.name).cloned(),
        };

        match reply {
            Some(MockReply::Respond(value)) => Ok(value),
            Some(MockReply::Fail(error)) => Err(error),
            None => Err(InferenceError::MalformedResponse(format!(
                "no scripted response for {}",
                schema.name
            ))),
        }
    }
}
