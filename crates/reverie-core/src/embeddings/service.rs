//! Embedding Service
//!
//! Single-model embedding encoder with:
//! - idempotent, serialized model initialization (first encode pays the load)
//! - an LRU vector cache keyed by a content hash of the raw text
//! - one residual model call per encode for all cache misses, chunked by the
//!   configured batch size
//!
//! The model call dominates every other cost here, so one mutex around the
//! cache is plenty; contention is not the bottleneck. Inference itself runs
//! on the blocking pool so callers' tasks are never stalled.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::debug;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default texts used to warm the model when the caller provides none
pub const DEFAULT_WARMUP_SAMPLES: [&str; 3] = [
    "Hello, how are you today?",
    "I'm having a great conversation!",
    "Tell me something you remember about me.",
];

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding model
    #[error("model initialization failed: {0}")]
    ModelInit(String),
    /// Failed to generate embeddings
    #[error("embedding generation failed: {0}")]
    EncodeFailed(String),
}

// ============================================================================
// MODEL CONTRACT
// ============================================================================

/// The underlying embedding model.
///
/// `encode_batch` is synchronous on purpose: inference backends block, and
/// the service wraps every call in `spawn_blocking`. All vectors returned
/// must have `dimensions()` floats; the dimension is fixed for the model's
/// lifetime.
pub trait EmbeddingModel: Send + Sync {
    /// Human-readable model identifier
    fn name(&self) -> &str;

    /// Load weights. Must be idempotent; called once by the service.
    fn load(&self) -> Result<(), EmbeddingError>;

    /// Encode a batch of texts, one vector per input, in input order.
    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Fixed output dimension
    fn dimensions(&self) -> usize;
}

// ============================================================================
// EMBEDDING SERVICE
// ============================================================================

type TextHash = [u8; 32];

fn text_hash(text: &str) -> TextHash {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.finalize().into()
}

/// Performance statistics for the embedding service
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingStats {
    pub model_name: String,
    pub dimensions: usize,
    pub total_encoded: u64,
    pub cache_hits: u64,
    pub cache_size: usize,
    pub avg_encode_ms: f64,
}

/// Service for generating and caching embeddings
pub struct EmbeddingService {
    model: Arc<dyn EmbeddingModel>,
    init: OnceCell<Result<(), EmbeddingError>>,
    cache: Mutex<LruCache<TextHash, Vec<f32>>>,
    batch_size: usize,
    total_encoded: AtomicU64,
    cache_hits: AtomicU64,
    total_encode_micros: AtomicU64,
}

impl EmbeddingService {
    /// Create a new service around a model.
    ///
    /// The model is NOT loaded here; the first `encode` (or an explicit
    /// `warmup`) pays the initialization cost. Zero sizes are bumped to one.
    pub fn new(model: Arc<dyn EmbeddingModel>, cache_size: usize, batch_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            model,
            init: OnceCell::new(),
            cache: Mutex::new(LruCache::new(capacity)),
            batch_size: batch_size.max(1),
            total_encoded: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            total_encode_micros: AtomicU64::new(0),
        }
    }

    /// Fixed output dimension of the wrapped model
    pub fn dimensions(&self) -> usize {
        self.model.dimensions()
    }

    /// Encode texts into vectors, preserving input order.
    ///
    /// Cached texts are served from the LRU cache; the residual misses go to
    /// the model in one batched pass. A failed model call fails the entire
    /// request, partial results are never returned.
    pub async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.ensure_init().await?;
        let started = Instant::now();

        // Partition into cached hits and residual misses
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<(usize, String)> = Vec::new();
        {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            for (i, text) in texts.iter().enumerate() {
                match cache.get(&text_hash(text)) {
                    Some(vector) => {
                        results[i] = Some(vector.clone());
                        self.cache_hits.fetch_add(1, Ordering::Relaxed);
                    }
                    None => misses.push((i, text.clone())),
                }
            }
        }

        if !misses.is_empty() {
            let miss_texts: Vec<String> = misses.iter().map(|(_, t)| t.clone()).collect();
            let vectors = self.encode_uncached(miss_texts).await?;

            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            for ((i, text), vector) in misses.into_iter().zip(vectors) {
                cache.put(text_hash(&text), vector.clone());
                results[i] = Some(vector);
            }
        }

        self.total_encoded
            .fetch_add(texts.len() as u64, Ordering::Relaxed);
        self.total_encode_micros
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);

        // Every slot was filled from the cache or the residual batch
        let out: Vec<Vec<f32>> = results.into_iter().flatten().collect();
        if out.len() != texts.len() {
            return Err(EmbeddingError::EncodeFailed(
                "model returned fewer vectors than requested".to_string(),
            ));
        }
        Ok(out)
    }

    /// Encode a single text
    pub async fn encode_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let texts = [text.to_string()];
        let mut vectors = self.encode(&texts).await?;
        vectors.pop().ok_or_else(|| {
            EmbeddingError::EncodeFailed("model returned no vector".to_string())
        })
    }

    /// Warm the model (and cache) with sample texts.
    ///
    /// Uses [`DEFAULT_WARMUP_SAMPLES`] when `samples` is empty.
    pub async fn warmup(&self, samples: &[String]) -> Result<(), EmbeddingError> {
        let samples: Vec<String> = if samples.is_empty() {
            DEFAULT_WARMUP_SAMPLES.iter().map(|s| s.to_string()).collect()
        } else {
            samples.to_vec()
        };

        let started = Instant::now();
        self.encode(&samples).await?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            count = samples.len(),
            "embedding model warmup complete"
        );
        Ok(())
    }

    /// Service statistics
    pub fn stats(&self) -> EmbeddingStats {
        let total = self.total_encoded.load(Ordering::Relaxed);
        let micros = self.total_encode_micros.load(Ordering::Relaxed);
        let cache_size = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        EmbeddingStats {
            model_name: self.model.name().to_string(),
            dimensions: self.model.dimensions(),
            total_encoded: total,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_size,
            avg_encode_ms: if total > 0 {
                micros as f64 / 1000.0 / total as f64
            } else {
                0.0
            },
        }
    }

    // ========================================================================
    // PRIVATE
    // ========================================================================

    /// Serialize model initialization; the stored result makes load failures
    /// permanent for the service's lifetime.
    async fn ensure_init(&self) -> Result<(), EmbeddingError> {
        let model = Arc::clone(&self.model);
        let result = self
            .init
            .get_or_init(|| async move {
                tokio::task::spawn_blocking(move || model.load())
                    .await
                    .unwrap_or_else(|e| {
                        Err(EmbeddingError::ModelInit(format!(
                            "model load task failed: {e}"
                        )))
                    })
            })
            .await;
        result.clone()
    }

    /// Run the residual batch through the model on the blocking pool,
    /// chunked by the configured batch size.
    async fn encode_uncached(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let expected = texts.len();
        let batch_size = self.batch_size;
        let model = Arc::clone(&self.model);

        let vectors = tokio::task::spawn_blocking(move || {
            let mut all = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(batch_size) {
                let encoded = model.encode_batch(chunk)?;
                if encoded.len() != chunk.len() {
                    return Err(EmbeddingError::EncodeFailed(format!(
                        "model returned {} vectors for {} texts",
                        encoded.len(),
                        chunk.len()
                    )));
                }
                all.extend(encoded);
            }
            Ok(all)
        })
        .await
        .unwrap_or_else(|e| {
            Err(EmbeddingError::EncodeFailed(format!(
                "encode task failed: {e}"
            )))
        })?;

        let dims = self.model.dimensions();
        if vectors.len() != expected || vectors.iter().any(|v| v.len() != dims) {
            return Err(EmbeddingError::EncodeFailed(
                "model output violated the fixed-dimension contract".to_string(),
            ));
        }
        Ok(vectors)
    }
}

// ============================================================================
// TESTS
// ============================================================================
