//! Exact k-nearest-neighbor index over chunk embeddings.
//!
//! Vectors are embedded once per generation through the injected
//! [`EmbeddingProvider`] and searched by brute force. The distance metric
//! is declared at build time and fixed for the generation.
//!
//! # Distance → similarity
//!
//! Fusion needs similarities in `[0, 1]`. The transform is monotonic
//! (lower distance → higher similarity) and invertible:
//!
//! | Metric | Distance | Similarity |
//! |--------|----------|------------|
//! | `Cosine` | `1 - cos(a, b)` ∈ `[0, 2]` | `1 - d / 2` |
//! | `L2` | `‖a - b‖₂` ∈ `[0, ∞)` | `1 / (1 + d)` |

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::embedding::{cosine_similarity, l2_distance, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::Chunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    #[default]
    L2,
}

impl DistanceMetric {
    pub fn distance(self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b) as f64,
            DistanceMetric::L2 => l2_distance(a, b) as f64,
        }
    }

    pub fn similarity(self, distance: f64) -> f64 {
        let s = match self {
            DistanceMetric::Cosine => 1.0 - distance / 2.0,
            DistanceMetric::L2 => 1.0 / (1.0 + distance.max(0.0)),
        };
        s.clamp(0.0, 1.0)
    }

    /// Inverse of [`similarity`](Self::similarity) on its range.
    pub fn distance_from_similarity(self, similarity: f64) -> f64 {
        match self {
            DistanceMetric::Cosine => 2.0 * (1.0 - similarity),
            DistanceMetric::L2 => 1.0 / similarity - 1.0,
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
        })
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" => Ok(DistanceMetric::L2),
            other => Err(Error::invalid(
                "dense_distance_metric",
                format!("unknown metric '{}', expected cosine or l2", other),
            )),
        }
    }
}

/// One hit from [`DenseIndex::search`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DenseHit {
    pub ordinal_id: usize,
    pub distance: f64,
}

#[derive(Debug)]
pub struct DenseIndex {
    generation: u64,
    metric: DistanceMetric,
    dims: usize,
    vectors: Vec<Vec<f32>>,
}

impl DenseIndex {
    /// Embed every chunk and build the index. `chunks[i]` gets ordinal id `i`.
    ///
    /// Texts are sent to the provider in batches of `batch_size`. The
    /// provider must return one vector per text, all of the same length.
    #[instrument(skip_all, fields(generation = generation, chunks = chunks.len(), metric = %metric))]
    pub async fn build(
        generation: u64,
        chunks: &[Chunk],
        embedder: &dyn EmbeddingProvider,
        metric: DistanceMetric,
        batch_size: usize,
    ) -> Result<Self> {
        let batch_size = batch_size.max(1);
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded = embedder.embed_batch(&texts).await.map_err(Error::Embedding)?;
            if embedded.len() != texts.len() {
                return Err(Error::Embedding(anyhow::anyhow!(
                    "provider returned {} vectors for {} texts",
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
        }

        let dims = vectors.first().map(Vec::len).unwrap_or_else(|| embedder.dims());
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(Error::DimensionMismatch {
                expected: dims,
                found: bad.len(),
            });
        }

        debug!(dims, "dense index built");
        Ok(Self {
            generation,
            metric,
            dims,
            vectors,
        })
    }

    /// Build from precomputed vectors.
    pub fn from_vectors(
        generation: u64,
        vectors: Vec<Vec<f32>>,
        metric: DistanceMetric,
    ) -> Result<Self> {
        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(Error::DimensionMismatch {
                expected: dims,
                found: bad.len(),
            });
        }
        Ok(Self {
            generation,
            metric,
            dims,
            vectors,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Return up to `k` hits ordered by ascending distance.
    ///
    /// Equal distances are ordered by ordinal id. Fewer than `k` hits are
    /// returned only when the index holds fewer than `k` vectors.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<DenseHit>> {
        if k == 0 {
            return Err(Error::invalid("k", "must be greater than 0"));
        }
        if self.vectors.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dims {
            return Err(Error::DimensionMismatch {
                expected: self.dims,
                found: query.len(),
            });
        }

        let mut hits: Vec<DenseHit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(ordinal_id, v)| DenseHit {
                ordinal_id,
                distance: self.metric.distance(query, v),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then(a.ordinal_id.cmp(&b.ordinal_id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    #[test]
    fn test_similarity_transforms() {
        assert_eq!(DistanceMetric::L2.similarity(0.0), 1.0);
        assert!((DistanceMetric::L2.similarity(1.0) - 0.5).abs() < 1e-12);
        assert_eq!(DistanceMetric::Cosine.similarity(0.0), 1.0);
        assert_eq!(DistanceMetric::Cosine.similarity(2.0), 0.0);
        assert!((DistanceMetric::Cosine.similarity(1.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_similarity_is_monotonic_and_invertible() {
        for metric in [DistanceMetric::L2, DistanceMetric::Cosine] {
            let distances = [0.0, 0.1, 0.5, 1.0, 1.5, 1.99];
            let sims: Vec<f64> = distances.iter().map(|d| metric.similarity(*d)).collect();
            for w in sims.windows(2) {
                assert!(w[0] > w[1], "{} similarity must decrease", metric);
            }
            for (d, s) in distances.iter().zip(&sims) {
                assert!((metric.distance_from_similarity(*s) - d).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!("L2".parse::<DistanceMetric>().unwrap(), DistanceMetric::L2);
        assert!("dot".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_search_orders_by_distance() {
        let idx = DenseIndex::from_vectors(
            1,
            vec![vec![0.0, 0.0], vec![3.0, 4.0], vec![1.0, 0.0]],
            DistanceMetric::L2,
        )
        .unwrap();
        let hits = idx.search(&[0.0, 0.0], 3).unwrap();
        let ids: Vec<usize> = hits.iter().map(|h| h.ordinal_id).collect();
        assert_eq!(ids, vec![0, 2, 1]);
        assert!((hits[2].distance - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_size_bounds() {
        let idx = DenseIndex::from_vectors(
            1,
            vec![vec![1.0], vec![2.0], vec![3.0]],
            DistanceMetric::L2,
        )
        .unwrap();
        assert_eq!(idx.search(&[0.0], 2).unwrap().len(), 2);
        assert_eq!(idx.search(&[0.0], 10).unwrap().len(), 3);
        assert!(idx.search(&[0.0], 0).unwrap_err().is_invalid_parameter());
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let idx = DenseIndex::from_vectors(1, vec![vec![1.0, 0.0]], DistanceMetric::Cosine).unwrap();
        let err = idx.search(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, found: 3 }));
    }

    #[test]
    fn test_ragged_vectors_rejected() {
        let err = DenseIndex::from_vectors(1, vec![vec![1.0, 0.0], vec![1.0]], DistanceMetric::L2)
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_build_with_embedder_batches() {
        let chunks: Vec<Chunk> = (0..5)
            .map(|i| Chunk::with_source(format!("chunk number {}", i), "t"))
            .collect();
        let embedder = HashingEmbedder::new(32);
        let idx = DenseIndex::build(3, &chunks, &embedder, DistanceMetric::Cosine, 2)
            .await
            .unwrap();
        assert_eq!(idx.len(), 5);
        assert_eq!(idx.dims(), 32);
        assert_eq!(idx.generation(), 3);

        let q = embedder.embed_text("chunk number 4");
        let hits = idx.search(&q, 1).unwrap();
        assert_eq!(hits[0].ordinal_id, 4);
        assert!(hits[0].distance < 1e-5);
    }
}
