//! # fusion-rag
//!
//! Retrieval-augmented question answering over a local document corpus.
//!
//! Documents are split into Markdown-aware chunks and indexed twice: a BM25
//! posting index for exact terms and a dense vector index for meaning.
//! Queries fuse both signals, a pairwise scorer reranks the survivors, and a
//! language model writes the answer from the top chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────────┐   ┌──────────────────────┐
//! │  Ingest    │──▶│ Segment + Embed │──▶│ Index generation N   │
//! │ files/HTTP │   │  (MarkdownSeg.) │   │ corpus · BM25 · k-NN │
//! └────────────┘   └─────────────────┘   └──────────┬───────────┘
//!                                                   │ snapshot
//!                        ┌──────────────────────────┤
//!                        ▼                          ▼
//!                 ┌─────────────┐   ┌────────┐   ┌──────────┐
//!                 │ hybrid      │──▶│ rerank │──▶│ generate │
//!                 │ search      │   └────────┘   └──────────┘
//!                 └─────────────┘
//! ```
//!
//! The index logic lives in `fusion-rag-core`; this crate adds providers,
//! configuration, ingestion, the CLI, and the HTTP server.
//!
//! ## Quick Start
//!
//! ```bash
//! rag ingest ./docs                    # segment and index, print counts
//! rag search "stateful agents" ./docs --explain
//! rag ask "What is LangGraph?" ./docs  # needs [generation] configured
//! rag serve                            # HTTP API on [server].bind
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Request, response, and document types |
//! | [`http`] | JSON POST with retry and backoff |
//! | [`embedding`] | Embedding providers |
//! | [`rerank`] | Pairwise scorer providers |
//! | [`generate`] | Answer generation providers |
//! | [`ingest`] | Corpus scanning and incremental ingestion |
//! | [`service`] | Composition root |
//! | [`search`] | `rag search` / `rag ask` |
//! | [`server`] | HTTP API |

pub mod config;
pub mod embedding;
pub mod generate;
pub mod http;
pub mod ingest;
pub mod models;
pub mod rerank;
pub mod search;
pub mod server;
pub mod service;
