//! Fingerprint and similarity engine.
//!
//! Fingerprints catch exact and near-exact duplicates for free. Everything
//! else is compared by cosine similarity of provider embeddings, cached per
//! fingerprint in a bounded LRU so a recently seen text is not embedded
//! twice. If embedding
//! fails after retries the engine scores by keyword overlap instead and
//! marks the score degraded.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::errors::InferenceError;
use crate::domain::text;
use crate::services::inference_client::InferenceClient;

pub use crate::domain::text::fingerprint;

/// A similarity value in [0, 1] and how it was obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityScore {
    pub value: f64,
    /// Keyword overlap was used instead of embeddings
    pub degraded: bool,
}

impl SimilarityScore {
    pub fn exact() -> Self {
        Self {
            value: 1.0,
            degraded: false,
        }
    }
}

/// Cosine similarity clamped to [0, 1].
///
/// Mismatched lengths, empty vectors and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());
    if cosine.is_finite() {
        cosine.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Keyword-overlap similarity used when embeddings are unavailable.
pub fn lexical_similarity(a: &str, b: &str) -> f64 {
    if text::fingerprint(a) == text::fingerprint(b) {
        return 1.0;
    }
    text::keyword_overlap(a, b)
}

/// Embeddings kept per engine before the least recently used is evicted.
pub const DEFAULT_EMBEDDING_CACHE_CAPACITY: usize = 8192;

pub struct SimilarityEngine {
    client: Arc<InferenceClient>,
    cache: Mutex<LruCache<String, Arc<Vec<f32>>>>,
}

impl SimilarityEngine {
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self::with_cache_capacity(client, DEFAULT_EMBEDDING_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(client: Arc<InferenceClient>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Embedding for `input`, from cache when the fingerprint was seen before.
    pub async fn embedding(&self, input: &str) -> Result<Arc<Vec<f32>>, InferenceError> {
        let key = fingerprint(input);
        if let Some(vector) = self.cache.lock().await.get(&key) {
            return Ok(Arc::clone(vector));
        }

        // Lock released across the provider call; a racing embed of the same text wins
        let vector = Arc::new(self.client.embed(input).await?);
        let mut cache = self.cache.lock().await;
        Ok(Arc::clone(cache.get_or_insert(key, || vector)))
    }

    /// Similarity of two texts. Never fails; degrades to keyword overlap.
    pub async fn similarity(&self, a: &str, b: &str) -> SimilarityScore {
        if fingerprint(a) == fingerprint(b) {
            return SimilarityScore::exact();
        }

        let embeddings = match self.embedding(a).await {
            Ok(left) => self.embedding(b).await.map(|right| (left, right)),
            Err(err) => Err(err),
        };

        match embeddings {
            Ok((left, right)) => {
                let value = cosine_similarity(&left, &right);
                debug!(similarity = value, "Embedding similarity computed");
                SimilarityScore {
                    value,
                    degraded: false,
                }
            }
            Err(err) => {
                warn!(error_kind = err.kind(), "Embedding unavailable, using lexical similarity");
                SimilarityScore {
                    value: lexical_similarity(a, b),
                    degraded: true,
                }
            }
        }
    }

    pub async fn cached_embeddings(&self) -> usize {
        self.cache.lock().await.len()
    }
}
