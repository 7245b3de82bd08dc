//! # fusion-rag core
//!
//! Retrieval logic for fusion-rag: the corpus store, the lexical (BM25)
//! and dense (k-NN) indices, hybrid score fusion, cross-encoder style
//! reranking, and the three-stage retrieve → rerank → generate pipeline.
//!
//! This crate performs no network, filesystem, or HTTP I/O. Embedding,
//! pairwise scoring, and generation are consumed through the traits in
//! [`capability`] and [`embedding`]; the application crate supplies the
//! concrete providers.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | `Chunk`, metadata values, scored candidates |
//! | [`error`] | Error taxonomy for indices and pipeline stages |
//! | [`tokenize`] | Pluggable tokenizer (shared by build and query) |
//! | [`lexical`] | BM25 posting index |
//! | [`dense`] | Exact k-NN index with a declared distance metric |
//! | [`corpus`] | Ordered chunk store addressed by ordinal id |
//! | [`generation`] | Index generations and the atomically swapped active handle |
//! | [`fusion`] | Hybrid retriever: normalization, fusion, tie-breaking |
//! | [`rerank`] | Batched pairwise reranking |
//! | [`pipeline`] | Orchestrator state machine |
//! | [`capability`] | Scoring, generation, and segmentation traits |
//! | [`embedding`] | Embedding trait, hashing embedder, vector math |
//! | [`chunk`] | Markdown-aware segmenter |

pub mod capability;
pub mod chunk;
pub mod corpus;
pub mod dense;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod generation;
pub mod lexical;
pub mod models;
pub mod pipeline;
pub mod rerank;
pub mod tokenize;

pub use error::{Error, PipelineError, Result};
pub use fusion::{HybridRetriever, RetrieverOptions};
pub use models::{CandidateSource, Chunk, Metadata, MetadataValue, ScoredCandidate};
pub use pipeline::{Orchestrator, PipelineConfig, PipelineContext, PipelineOutput, Stage};
pub use rerank::Reranker;
