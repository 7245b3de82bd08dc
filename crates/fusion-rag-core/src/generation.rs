//! Index generations and the active-generation handle.
//!
//! An [`IndexGeneration`] bundles a corpus with the lexical and dense
//! indices derived from it. The three parts are stamped with the same
//! generation number and are only ever read together.
//!
//! [`ActiveIndex`] holds the generation that queries currently see.
//! Rebuilds construct a new generation off to the side and then swap a
//! single `Arc` under a short write lock. Readers hold the read lock only
//! long enough to clone that `Arc`, so a query keeps the generation it
//! started with even if a rebuild publishes a new one mid-query.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::corpus::CorpusStore;
use crate::dense::{DenseIndex, DistanceMetric};
use crate::error::{Error, Result};
use crate::lexical::LexicalIndex;

#[derive(Debug)]
pub struct IndexGeneration {
    number: u64,
    corpus: CorpusStore,
    indices: Option<(LexicalIndex, DenseIndex)>,
}

impl IndexGeneration {
    /// Bundle a corpus with its indices, verifying they belong together.
    pub fn assemble(corpus: CorpusStore, lexical: LexicalIndex, dense: DenseIndex) -> Result<Self> {
        let number = corpus.generation();
        let generation = Self {
            number,
            corpus,
            indices: Some((lexical, dense)),
        };
        generation.ensure_consistent()?;
        Ok(generation)
    }

    /// A generation with no chunks. Queries against it return no results.
    pub fn empty(number: u64) -> Self {
        Self {
            number,
            corpus: CorpusStore::build(number, Vec::new()),
            indices: None,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn corpus(&self) -> &CorpusStore {
        &self.corpus
    }

    pub fn lexical(&self) -> Option<&LexicalIndex> {
        self.indices.as_ref().map(|(l, _)| l)
    }

    pub fn dense(&self) -> Option<&DenseIndex> {
        self.indices.as_ref().map(|(_, d)| d)
    }

    pub fn metric(&self) -> Option<DistanceMetric> {
        self.dense().map(DenseIndex::metric)
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    /// Check that corpus, lexical, and dense index share a generation and a chunk count.
    pub fn ensure_consistent(&self) -> Result<()> {
        let expected = self.number;
        if self.corpus.generation() != expected {
            return Err(Error::GenerationMismatch {
                component: "corpus",
                expected,
                found: self.corpus.generation(),
            });
        }
        let Some((lexical, dense)) = &self.indices else {
            return Ok(());
        };
        if lexical.generation() != expected {
            return Err(Error::GenerationMismatch {
                component: "lexical index",
                expected,
                found: lexical.generation(),
            });
        }
        if dense.generation() != expected {
            return Err(Error::GenerationMismatch {
                component: "dense index",
                expected,
                found: dense.generation(),
            });
        }
        if lexical.len() != self.corpus.len() || dense.len() != self.corpus.len() {
            return Err(Error::invalid(
                "indices",
                format!(
                    "corpus has {} chunks but lexical has {} and dense has {}",
                    self.corpus.len(),
                    lexical.len(),
                    dense.len()
                ),
            ));
        }
        Ok(())
    }
}

/// Handle to the generation currently served to queries.
#[derive(Debug, Default)]
pub struct ActiveIndex {
    current: RwLock<Option<Arc<IndexGeneration>>>,
    last_reserved: AtomicU64,
    rebuild: Mutex<()>,
}

impl ActiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The generation queries should read, or [`Error::IndexNotReady`] before the first build.
    pub fn load(&self) -> Result<Arc<IndexGeneration>> {
        self.current.read().clone().ok_or(Error::IndexNotReady)
    }

    pub fn current_number(&self) -> Option<u64> {
        self.current.read().as_ref().map(|g| g.number())
    }

    /// Serialize rebuilds. Hold the guard from [`reserve`](Self::reserve) through
    /// [`publish`](Self::publish).
    pub async fn lock_rebuild(&self) -> MutexGuard<'_, ()> {
        self.rebuild.lock().await
    }

    /// Reserve the next generation number.
    pub fn reserve(&self) -> u64 {
        self.last_reserved.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Make `generation` the active one. Returns its number.
    ///
    /// Fails without swapping if the generation is inconsistent or older
    /// than the one already active.
    pub fn publish(&self, generation: IndexGeneration) -> Result<u64> {
        generation.ensure_consistent()?;
        let number = generation.number();
        let chunks = generation.len();
        let next = Arc::new(generation);

        let mut current = self.current.write();
        if let Some(active) = current.as_ref() {
            if active.number() >= number {
                return Err(Error::GenerationMismatch {
                    component: "published generation",
                    expected: active.number() + 1,
                    found: number,
                });
            }
        }
        *current = Some(next);
        drop(current);

        info!(generation = number, chunks, "published index generation");
        Ok(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::Bm25Params;
    use crate::models::Chunk;
    use crate::tokenize::SimpleTokenizer;

    fn parts(number: u64, texts: &[&str]) -> (CorpusStore, LexicalIndex, DenseIndex) {
        let chunks: Vec<Chunk> = texts.iter().map(|t| Chunk::with_source(*t, "t")).collect();
        let corpus = CorpusStore::build(number, chunks);
        let lexical =
            LexicalIndex::build(number, corpus.chunks(), &SimpleTokenizer, Bm25Params::default())
                .unwrap();
        let vectors = (0..texts.len()).map(|i| vec![i as f32]).collect();
        let dense = DenseIndex::from_vectors(number, vectors, DistanceMetric::L2).unwrap();
        (corpus, lexical, dense)
    }

    #[test]
    fn test_assemble_matching_parts() {
        let (c, l, d) = parts(4, &["a", "b"]);
        let g = IndexGeneration::assemble(c, l, d).unwrap();
        assert_eq!(g.number(), 4);
        assert_eq!(g.len(), 2);
        assert_eq!(g.metric(), Some(DistanceMetric::L2));
    }

    #[test]
    fn test_assemble_rejects_mixed_generations() {
        let (c, l, _) = parts(4, &["a", "b"]);
        let (_, _, d_old) = parts(3, &["a", "b"]);
        let err = IndexGeneration::assemble(c, l, d_old).unwrap_err();
        assert!(matches!(
            err,
            Error::GenerationMismatch {
                component: "dense index",
                expected: 4,
                found: 3
            }
        ));
    }

    #[test]
    fn test_assemble_rejects_count_mismatch() {
        let (c, l, _) = parts(5, &["a", "b"]);
        let (_, _, d) = parts(5, &["a", "b", "c"]);
        assert!(IndexGeneration::assemble(c, l, d).is_err());
    }

    #[test]
    fn test_load_before_publish() {
        let active = ActiveIndex::new();
        assert!(matches!(active.load(), Err(Error::IndexNotReady)));
        assert_eq!(active.current_number(), None);
    }

    #[tokio::test]
    async fn test_publish_swaps_and_keeps_old_readers() {
        let active = ActiveIndex::new();
        let _guard = active.lock_rebuild().await;

        let n1 = active.reserve();
        let (c, l, d) = parts(n1, &["first"]);
        active.publish(IndexGeneration::assemble(c, l, d).unwrap()).unwrap();
        let held = active.load().unwrap();

        let n2 = active.reserve();
        let (c, l, d) = parts(n2, &["second", "gen"]);
        active.publish(IndexGeneration::assemble(c, l, d).unwrap()).unwrap();

        assert_eq!(held.number(), n1);
        assert_eq!(held.corpus().get(0).unwrap().content, "first");
        assert_eq!(active.load().unwrap().number(), n2);
        assert_eq!(active.current_number(), Some(n2));
    }

    #[test]
    fn test_publish_rejects_stale_generation() {
        let active = ActiveIndex::new();
        active.publish(IndexGeneration::empty(5)).unwrap();
        let err = active.publish(IndexGeneration::empty(3)).unwrap_err();
        assert!(matches!(err, Error::GenerationMismatch { .. }));
        assert_eq!(active.current_number(), Some(5));
    }
}
