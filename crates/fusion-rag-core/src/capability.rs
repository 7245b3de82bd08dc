//! Capabilities the core consumes but does not implement.
//!
//! Pairwise relevance scoring, answer generation, and segmentation are
//! injected through these traits. Embedding lives in
//! [`embedding`](crate::embedding) alongside the vector helpers.
//!
//! [`TermOverlapScorer`] is the one concrete scorer shipped here; it needs
//! no model and gives deterministic scores for tests and offline use.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Metadata};
use crate::tokenize::{SimpleTokenizer, Tokenizer};

/// Pairwise `(query, text)` relevance function used by the reranker.
///
/// Higher is more relevant. Scores only need to be comparable within one
/// query.
#[async_trait]
pub trait CrossScorer: Send + Sync {
    fn model_name(&self) -> &str;

    async fn cross_score(&self, query: &str, text: &str) -> Result<f32>;

    /// Score several texts against one query. Must return one score per text.
    async fn cross_score_batch(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(texts.len());
        for text in texts {
            scores.push(self.cross_score(query, text).await?);
        }
        Ok(scores)
    }
}

/// Produces an answer for `question` given the assembled `context`.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, question: &str, context: &str) -> Result<String>;
}

/// Splits a document into chunks. `metadata` is copied onto every chunk.
pub trait Segmenter: Send + Sync {
    fn segment(&self, text: &str, metadata: &Metadata) -> Result<Vec<Chunk>>;
}

/// Scores by the fraction of distinct query terms the text contains.
///
/// A bonus of up to `0.1` is added when matched terms appear close
/// together in the text, so `"borrow checker"` outranks a text where the
/// two words are paragraphs apart.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermOverlapScorer;

impl TermOverlapScorer {
    pub const MODEL_NAME: &'static str = "term-overlap";

    pub fn score(&self, query: &str, text: &str) -> f32 {
        let query_terms: HashSet<String> = SimpleTokenizer.tokenize(query).into_iter().collect();
        if query_terms.is_empty() {
            return 0.0;
        }
        let text_terms = SimpleTokenizer.tokenize(text);

        let positions: Vec<usize> = text_terms
            .iter()
            .enumerate()
            .filter(|(_, t)| query_terms.contains(*t))
            .map(|(i, _)| i)
            .collect();
        let matched: HashSet<&String> = positions.iter().map(|&i| &text_terms[i]).collect();
        if matched.is_empty() {
            return 0.0;
        }

        let coverage = matched.len() as f32 / query_terms.len() as f32;
        let proximity = match (positions.first(), positions.last()) {
            (Some(first), Some(last)) if matched.len() > 1 => {
                let span = (last - first + 1) as f32;
                0.1 * (matched.len() as f32 / span).min(1.0)
            }
            _ => 0.0,
        };
        coverage + proximity
    }
}

#[async_trait]
impl CrossScorer for TermOverlapScorer {
    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }

    async fn cross_score(&self, query: &str, text: &str) -> Result<f32> {
        Ok(self.score(query, text))
    }
}
