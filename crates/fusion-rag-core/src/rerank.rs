//! Second-pass reranking of a short candidate list.
//!
//! The reranker owns batching, sorting, and truncation. The relevance
//! function is an injected [`CrossScorer`]. It only ever sees the fusion
//! engine's top-k, never the whole corpus.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::capability::CrossScorer;
use crate::error::{Error, Result};
use crate::models::Chunk;

#[derive(Clone)]
pub struct Reranker {
    scorer: Arc<dyn CrossScorer>,
    batch_size: usize,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn CrossScorer>, batch_size: usize) -> Self {
        Self {
            scorer,
            batch_size: batch_size.max(1),
        }
    }

    pub fn model_name(&self) -> &str {
        self.scorer.model_name()
    }

    /// Rerank `candidates` for `query` and keep the best `top_n`.
    ///
    /// Returns `min(top_n, candidates.len())` chunks, descending by
    /// pairwise score. Equal scores keep their incoming order.
    pub async fn rerank(&self, query: &str, candidates: Vec<Chunk>, top_n: usize) -> Result<Vec<Chunk>> {
        Ok(self
            .rerank_with_scores(query, candidates, top_n)
            .await?
            .into_iter()
            .map(|(chunk, _)| chunk)
            .collect())
    }

    /// Like [`rerank`](Self::rerank), also returning each chunk's pairwise score.
    #[instrument(skip_all, fields(candidates = candidates.len(), top_n = top_n))]
    pub async fn rerank_with_scores(
        &self,
        query: &str,
        candidates: Vec<Chunk>,
        top_n: usize,
    ) -> Result<Vec<(Chunk, f32)>> {
        if top_n == 0 {
            return Err(Error::invalid("top_n", "must be greater than 0"));
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut scores: Vec<f32> = Vec::with_capacity(candidates.len());
        for batch in candidates.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let batch_scores = self
                .scorer
                .cross_score_batch(query, &texts)
                .await
                .map_err(Error::Scoring)?;
            if batch_scores.len() != texts.len() {
                return Err(Error::Scoring(anyhow::anyhow!(
                    "scorer returned {} scores for {} texts",
                    batch_scores.len(),
                    texts.len()
                )));
            }
            if let Some(bad) = batch_scores.iter().find(|s| !s.is_finite()) {
                return Err(Error::Scoring(anyhow::anyhow!(
                    "scorer returned non-finite score {}",
                    bad
                )));
            }
            scores.extend(batch_scores);
        }

        let mut scored: Vec<(Chunk, f32)> = candidates.into_iter().zip(scores).collect();
        // Stable: equal scores keep fused-rank order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(top_n);

        debug!(
            model = self.scorer.model_name(),
            kept = scored.len(),
            "reranked candidates"
        );
        Ok(scored)
    }
}
