//! Embedding backend contract and the built-in feature-hash model
//!
//! The core sees an embedding backend as `string -> fixed-dim vector`
//! behind the [`Embedder`] trait. Real model runtimes (ONNX, remote APIs)
//! plug in behind the same trait; the in-tree default is a deterministic
//! feature-hashing embedder that needs no model files and keeps the whole
//! system usable offline.

use crate::cancel::CancelToken;
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Identity of an embedding model. Two identities are compatible iff one
/// declares the other in `compatible` and they share `dims`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub repo: String,
    pub dims: usize,
    /// Model ids whose serialized embeddings this model can reuse.
    pub compatible: Vec<String>,
}

impl ModelInfo {
    pub fn accepts(&self, cached_id: &str, cached_dims: usize) -> bool {
        if cached_dims != self.dims {
            return false;
        }
        cached_id == self.id || self.compatible.iter().any(|c| c == cached_id)
    }
}

/// The embedding model contract: text in, fixed-dim vector out.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn info(&self) -> &ModelInfo;

    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>>;
}

/// Deterministic feature-hashing embedder: token unigrams and bigrams are
/// hashed into signed buckets, then L2-normalized. Not a learned model,
/// but stable across runs and good enough for lexical-adjacent recall.
pub struct HashEmbedder {
    info: ModelInfo,
}

impl HashEmbedder {
    pub const DEFAULT_DIMS: usize = 384;

    pub fn new(dims: usize) -> Self {
        HashEmbedder {
            info: ModelInfo {
                id: format!("feature-hash-{dims}"),
                repo: "builtin".to_string(),
                dims,
                compatible: Vec::new(),
            },
        }
    }

    /// Construct from a model identity string such as `feature-hash-384`.
    pub fn from_model_id(id: &str) -> CoreResult<Self> {
        let dims = id
            .strip_prefix("feature-hash-")
            .and_then(|d| d.parse::<usize>().ok())
            .ok_or_else(|| {
                CoreError::InvalidArgument(format!(
                    "unknown embedding model `{id}` (expected feature-hash-<dims>)"
                ))
            })?;
        if dims == 0 || dims > 4096 {
            return Err(CoreError::InvalidArgument(format!(
                "embedding dims out of range: {dims}"
            )));
        }
        Ok(Self::new(dims))
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut acc = vec![0.0f32; self.info.dims];
        let tokens = tokenize(text);
        let mut prev: Option<&str> = None;
        for token in &tokens {
            bump(&mut acc, token.as_bytes(), 1.0);
            if let Some(prev) = prev {
                bump(&mut acc, format!("{prev} {token}").as_bytes(), 0.5);
            }
            prev = Some(token);
        }
        normalize(acc)
    }
}

fn bump(acc: &mut [f32], feature: &[u8], weight: f32) {
    let hash = xxh3_64_with_seed(feature, 0x1a77);
    let idx = (hash >> 1) as usize % acc.len();
    let sign = if hash & 1 == 0 { 1.0 } else { -1.0 };
    acc[idx] += sign * weight;
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .flat_map(split_identifier)
        .filter(|t| t.len() >= 2)
        .collect()
}

/// Split `snake_case` and `camelCase` identifiers into lowercase words.
fn split_identifier(raw: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in raw.chars() {
        if c == '_' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if c.is_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
            current.push(c.to_ascii_lowercase());
        } else {
            current.push(c.to_ascii_lowercase());
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

/// Bounded worker pool in front of the embedding backend. Callers queue on
/// the semaphore; every call carries a deadline and honors cancellation so
/// an abandoned query does not retain a worker.
#[derive(Clone)]
pub struct EmbeddingPool {
    embedder: Arc<dyn Embedder>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl EmbeddingPool {
    pub fn new(embedder: Arc<dyn Embedder>, workers: usize, timeout: Duration) -> Self {
        EmbeddingPool {
            embedder,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    pub fn info(&self) -> &ModelInfo {
        self.embedder.info()
    }

    pub async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        self.embed_cancellable(text, &CancelToken::new()).await
    }

    pub async fn embed_cancellable(
        &self,
        text: &str,
        cancel: &CancelToken,
    ) -> CoreResult<Vec<f32>> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CoreError::Internal("embedding pool closed".into()))?;
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        tokio::time::timeout(self.timeout, self.embedder.embed(text))
            .await
            .map_err(|_| CoreError::TimedOut(format!("embedding call after {:?}", self.timeout)))?
    }

    /// Embed a batch with pool-bounded concurrency, preserving input
    /// order. Per-item failures are returned in place, not propagated.
    pub async fn embed_many(&self, texts: Vec<String>) -> Vec<CoreResult<Vec<f32>>> {
        let handles: Vec<_> = texts
            .into_iter()
            .map(|text| {
                let pool = self.clone();
                tokio::spawn(async move { pool.embed(&text).await })
            })
            .collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(CoreError::Internal(format!("embedding task panicked: {e}"))),
            });
        }
        out
    }
}
