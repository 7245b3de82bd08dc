//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that every embedding backend
//! implements, the offline [`HashingEmbedder`], and the distance helpers
//! used by the dense index.
//!
//! Network-backed providers (OpenAI, Ollama) and local model inference
//! live in the `fusion-rag` application crate.

use anyhow::Result;
use async_trait::async_trait;

use crate::tokenize::{SimpleTokenizer, Tokenizer};

/// Trait for embedding providers.
///
/// `embed_batch` must return exactly one vector per input text, in input
/// order, each of length [`dims`](EmbeddingProvider::dims).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Deterministic bag-of-words embedder.
///
/// Hashes each term into one of `dims` buckets with FNV-1a, weights it by
/// relative term frequency, and L2-normalizes the result. Texts that share
/// terms land close together; texts with disjoint vocabularies are
/// orthogonal up to bucket collisions. Needs no model and no network.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub const MODEL_NAME: &'static str = "hashing-tf";

    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn bucket(&self, term: &str) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % self.dims as u64) as usize
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let tokens = SimpleTokenizer.tokenize(text);
        let mut vec = vec![0.0f32; self.dims];
        if tokens.is_empty() {
            return vec;
        }

        let weight = 1.0 / tokens.len() as f32;
        for token in &tokens {
            vec[self.bucket(token)] += weight;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

/// Euclidean distance. Vectors must have equal length.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
