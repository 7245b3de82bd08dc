//! BM25 lexical index.
//!
//! Built once per index generation from the full corpus. Stores, per term,
//! a posting list of `(ordinal_id, term_frequency)` plus per-chunk lengths
//! and the average chunk length.
//!
//! # Scoring
//!
//! Okapi BM25 with a non-negative IDF:
//!
//! ```text
//! idf(t)      = ln(1 + (N - df(t) + 0.5) / (df(t) + 0.5))
//! score(d, q) = Σ_{t ∈ q} idf(t) · tf(t,d)·(k1 + 1) / (tf(t,d) + k1·(1 - b + b·|d|/avgdl))
//! ```
//!
//! Only chunks that contain at least one query term get an entry in the
//! result. An absent entry means "no overlap", which callers treat as zero
//! but keep distinct from an explicitly scored chunk.

use std::collections::HashMap;

use tracing::instrument;

use crate::error::{Error, Result};
use crate::models::Chunk;
use crate::tokenize::Tokenizer;

/// BM25 tuning constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

#[derive(Debug)]
pub struct LexicalIndex {
    generation: u64,
    params: Bm25Params,
    postings: HashMap<String, Vec<(usize, u32)>>,
    doc_lengths: Vec<u32>,
    avg_doc_length: f64,
}

impl LexicalIndex {
    /// Build the index over the whole corpus.
    ///
    /// `chunks[i]` is indexed under ordinal id `i`. Fails with
    /// [`Error::EmptyCorpus`] for an empty slice.
    #[instrument(skip_all, fields(generation = generation, chunks = chunks.len()))]
    pub fn build(
        generation: u64,
        chunks: &[Chunk],
        tokenizer: &dyn Tokenizer,
        params: Bm25Params,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();
        let mut doc_lengths = Vec::with_capacity(chunks.len());

        for (ordinal, chunk) in chunks.iter().enumerate() {
            let tokens = tokenizer.tokenize(&chunk.content);
            doc_lengths.push(tokens.len() as u32);

            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_default() += 1;
            }
            for (term, count) in tf {
                postings.entry(term).or_default().push((ordinal, count));
            }
        }

        let total: u64 = doc_lengths.iter().map(|&l| l as u64).sum();
        let avg_doc_length = total as f64 / doc_lengths.len() as f64;

        Ok(Self {
            generation,
            params,
            postings,
            doc_lengths,
            avg_doc_length,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lengths.is_empty()
    }

    /// Number of chunks containing `term`.
    pub fn document_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map(Vec::len).unwrap_or(0)
    }

    fn idf(&self, df: usize) -> f64 {
        let n = self.doc_lengths.len() as f64;
        let df = df as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Score every chunk that shares at least one term with `query_terms`.
    ///
    /// A term repeated in the query contributes once per occurrence.
    pub fn score(&self, query_terms: &[String]) -> HashMap<usize, f64> {
        let mut scores: HashMap<usize, f64> = HashMap::new();
        let Bm25Params { k1, b } = self.params;
        // Empty chunks give avgdl = 0; treat every chunk as average length.
        let avgdl = if self.avg_doc_length > 0.0 {
            self.avg_doc_length
        } else {
            1.0
        };

        for term in query_terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf(postings.len());
            for &(ordinal, tf) in postings {
                let tf = tf as f64;
                let dl = self.doc_lengths[ordinal] as f64;
                let denom = tf + k1 * (1.0 - b + b * dl / avgdl);
                *scores.entry(ordinal).or_insert(0.0) += idf * tf * (k1 + 1.0) / denom;
            }
        }

        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize::SimpleTokenizer;

    fn corpus(texts: &[&str]) -> Vec<Chunk> {
        texts.iter().map(|t| Chunk::with_source(*t, "test")).collect()
    }

    fn terms(q: &str) -> Vec<String> {
        SimpleTokenizer.tokenize(q)
    }

    #[test]
    fn test_empty_corpus_rejected() {
        let err = LexicalIndex::build(1, &[], &SimpleTokenizer, Bm25Params::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyCorpus));
    }

    #[test]
    fn test_absent_when_no_overlap() {
        let chunks = corpus(&["rust borrow checker", "python garbage collector"]);
        let idx = LexicalIndex::build(1, &chunks, &SimpleTokenizer, Bm25Params::default()).unwrap();
        let scores = idx.score(&terms("borrow"));
        assert_eq!(scores.len(), 1);
        assert!(scores.contains_key(&0));
        assert!(!scores.contains_key(&1));
    }

    #[test]
    fn test_rarer_term_scores_higher() {
        let chunks = corpus(&[
            "common words here",
            "common words and rare",
            "common words again",
        ]);
        let idx = LexicalIndex::build(1, &chunks, &SimpleTokenizer, Bm25Params::default()).unwrap();
        let common = idx.score(&terms("common"));
        let rare = idx.score(&terms("rare"));
        assert_eq!(common.len(), 3);
        assert!(rare[&1] > common[&1]);
        for s in common.values() {
            assert!(*s > 0.0, "idf must stay positive for ubiquitous terms");
        }
    }

    #[test]
    fn test_term_frequency_and_length_normalization() {
        let chunks = corpus(&[
            "cache cache cache",
            "cache",
            "cache plus many other unrelated filler words in this chunk",
        ]);
        let idx = LexicalIndex::build(1, &chunks, &SimpleTokenizer, Bm25Params::default()).unwrap();
        let s = idx.score(&terms("cache"));
        assert!(s[&0] > s[&1]);
        assert!(s[&1] > s[&2]);
    }

    #[test]
    fn test_statistics() {
        let chunks = corpus(&["a b", "b c d", ""]);
        let idx = LexicalIndex::build(7, &chunks, &SimpleTokenizer, Bm25Params::default()).unwrap();
        assert_eq!(idx.generation(), 7);
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.document_frequency("b"), 2);
        assert_eq!(idx.document_frequency("z"), 0);
        assert!((idx.avg_doc_length - 5.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_terms_give_empty_map() {
        let chunks = corpus(&["alpha beta"]);
        let idx = LexicalIndex::build(1, &chunks, &SimpleTokenizer, Bm25Params::default()).unwrap();
        assert!(idx.score(&terms("gamma delta")).is_empty());
        assert!(idx.score(&[]).is_empty());
    }
}
