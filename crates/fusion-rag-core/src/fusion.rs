//! Hybrid retrieval: dense + lexical candidates fused into one ranking.
//!
//! Dense distances and BM25 scores live on incomparable scales, so each
//! side is mapped into `[0, 1]` before mixing.
//!
//! # Fusion Algorithm
//!
//! 1. Dense search for the top `k` chunks; map each distance to a
//!    similarity with the generation's [`DistanceMetric`] transform.
//! 2. BM25-score the full query; min-max normalize the scores present.
//!    Chunks with no term overlap count as `0`.
//! 3. Union both id sets: `fused = α × dense + (1 - α) × sparse`, with
//!    `0` for whichever side did not return the chunk.
//! 4. Sort by `fused` (desc), then chunks found by both signals first,
//!    then ordinal id (asc).
//! 5. Truncate to `k`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::corpus::CorpusStore;
use crate::dense::{DenseHit, DenseIndex, DistanceMetric};
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::generation::{ActiveIndex, IndexGeneration};
use crate::lexical::{Bm25Params, LexicalIndex};
use crate::models::{CandidateSource, Chunk, ScoredCandidate};
use crate::tokenize::{SimpleTokenizer, Tokenizer};

/// Build-time settings that stay fixed for the lifetime of a generation.
#[derive(Debug, Clone)]
pub struct RetrieverOptions {
    pub metric: DistanceMetric,
    pub bm25: Bm25Params,
    /// Texts per `embed_batch` call during builds.
    pub embed_batch_size: usize,
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::L2,
            bm25: Bm25Params::default(),
            embed_batch_size: 64,
        }
    }
}

/// Owns the active index generation and answers hybrid queries against it.
///
/// One instance is shared (behind an `Arc`) by every request and by the
/// ingestion path; it never needs to be reconstructed when the corpus changes.
pub struct HybridRetriever {
    active: ActiveIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    tokenizer: Arc<dyn Tokenizer>,
    options: RetrieverOptions,
}

impl HybridRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, options: RetrieverOptions) -> Self {
        Self::with_tokenizer(embedder, Arc::new(SimpleTokenizer), options)
    }

    pub fn with_tokenizer(
        embedder: Arc<dyn EmbeddingProvider>,
        tokenizer: Arc<dyn Tokenizer>,
        options: RetrieverOptions,
    ) -> Self {
        Self {
            active: ActiveIndex::new(),
            embedder,
            tokenizer,
            options,
        }
    }

    pub fn options(&self) -> &RetrieverOptions {
        &self.options
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    /// The generation queries currently read.
    pub fn snapshot(&self) -> Result<Arc<IndexGeneration>> {
        self.active.load()
    }

    pub fn current_generation(&self) -> Option<u64> {
        self.active.current_number()
    }

    /// Rebuild corpus, lexical index, and dense index from `chunks` and swap
    /// them in as one unit. Returns the new generation number.
    ///
    /// In-flight queries keep reading the previous generation. On failure
    /// the previous generation stays active.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn build_indices(&self, chunks: Vec<Chunk>) -> Result<u64> {
        let _rebuild = self.active.lock_rebuild().await;
        let number = self.active.reserve();

        let corpus = CorpusStore::build(number, chunks);
        if corpus.is_empty() {
            return self.active.publish(IndexGeneration::empty(number));
        }

        let lexical = LexicalIndex::build(
            number,
            corpus.chunks(),
            self.tokenizer.as_ref(),
            self.options.bm25,
        )?;
        let dense = DenseIndex::build(
            number,
            corpus.chunks(),
            self.embedder.as_ref(),
            self.options.metric,
            self.options.embed_batch_size,
        )
        .await?;

        let generation = IndexGeneration::assemble(corpus, lexical, dense)?;
        self.active.publish(generation)
    }

    /// Fused top-`k` for `query`. `alpha` is the dense weight
    /// (`1.0` = dense only, `0.0` = lexical only).
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn hybrid_search(
        &self,
        query: &str,
        k: usize,
        alpha: f64,
    ) -> Result<Vec<ScoredCandidate>> {
        validate_query_params(k, alpha)?;
        let generation = self.active.load()?;
        generation.ensure_consistent()?;

        if generation.is_empty() || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let (Some(lexical), Some(dense)) = (generation.lexical(), generation.dense()) else {
            return Err(Error::IndexNotReady);
        };

        let query_vec = self.embedder.embed(query).await.map_err(Error::Embedding)?;
        let dense_hits = dense.search(&query_vec, k)?;
        let lexical_scores = lexical.score(&self.tokenizer.tokenize(query));

        let results = fuse(&generation, &dense_hits, &lexical_scores, k, alpha);
        debug!(
            generation = generation.number(),
            dense = dense_hits.len(),
            lexical = lexical_scores.len(),
            returned = results.len(),
            "hybrid search"
        );
        Ok(results)
    }
}

/// Reject `k == 0` and `alpha` outside `[0, 1]`.
pub fn validate_query_params(k: usize, alpha: f64) -> Result<()> {
    if k == 0 {
        return Err(Error::invalid("k", "must be greater than 0"));
    }
    if !(0.0..=1.0).contains(&alpha) {
        return Err(Error::invalid(
            "alpha",
            format!("must be within [0.0, 1.0], got {}", alpha),
        ));
    }
    Ok(())
}

/// Min-max normalize raw scores to `[0.0, 1.0]`.
///
/// If all scores are equal, they are normalized to `1.0`.
pub fn normalize_scores(scores: &HashMap<usize, f64>) -> HashMap<usize, f64> {
    if scores.is_empty() {
        return HashMap::new();
    }

    let s_min = scores.values().copied().fold(f64::INFINITY, f64::min);
    let s_max = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);

    scores
        .iter()
        .map(|(&id, &raw)| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (raw - s_min) / (s_max - s_min)
            };
            (id, norm)
        })
        .collect()
}

/// Merge dense hits and lexical scores from `generation` into one ranked list.
pub fn fuse(
    generation: &IndexGeneration,
    dense_hits: &[DenseHit],
    lexical_scores: &HashMap<usize, f64>,
    k: usize,
    alpha: f64,
) -> Vec<ScoredCandidate> {
    let metric = generation.metric().unwrap_or_default();
    let sparse = normalize_scores(lexical_scores);

    let mut dense: HashMap<usize, f64> = HashMap::with_capacity(dense_hits.len());
    for hit in dense_hits {
        dense.insert(hit.ordinal_id, metric.similarity(hit.distance));
    }

    let mut ids: Vec<usize> = dense.keys().chain(sparse.keys()).copied().collect();
    ids.sort_unstable();
    ids.dedup();

    let mut scored: Vec<ScoredCandidate> = ids
        .into_iter()
        .filter_map(|id| {
            let chunk = generation.corpus().get(id)?;
            let d = dense.get(&id).copied();
            let s = sparse.get(&id).copied();
            let source = match (d, s) {
                (Some(_), Some(_)) => CandidateSource::Both,
                (Some(_), None) => CandidateSource::Dense,
                _ => CandidateSource::Sparse,
            };
            let fused = alpha * d.unwrap_or(0.0) + (1.0 - alpha) * s.unwrap_or(0.0);
            Some(ScoredCandidate {
                chunk: chunk.clone(),
                score: fused,
                dense_similarity: d,
                sparse_score: s,
                source,
                generation: generation.number(),
            })
        })
        .collect();

    scored.sort_by(|a, b| rank_order(a, b, alpha));
    scored.truncate(k);
    scored
}

/// Fused score desc, then candidates found by both signals, then candidates
/// with an explicit score for a signal `alpha` weights, then ordinal id asc.
///
/// Min-max normalization maps the weakest lexical match to `0.0`, the same
/// fused contribution as a chunk the lexical index never scored. The third key
/// keeps such a match ahead of an unscored chunk.
fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate, alpha: f64) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            let a_both = a.source == CandidateSource::Both;
            let b_both = b.source == CandidateSource::Both;
            b_both.cmp(&a_both)
        })
        .then_with(|| weighted_signals(b, alpha).cmp(&weighted_signals(a, alpha)))
        .then(a.chunk.ordinal_id.cmp(&b.chunk.ordinal_id))
}

/// Number of signals present on `candidate` that carry non-zero weight.
fn weighted_signals(candidate: &ScoredCandidate, alpha: f64) -> u8 {
    u8::from(alpha > 0.0 && candidate.dense_similarity.is_some())
        + u8::from(alpha < 1.0 && candidate.sparse_score.is_some())
}
