//! TOML configuration.
//!
//! Every section has defaults, so an empty file (or no file at all, via
//! [`Config::minimal`]) yields a working offline setup: hashing embeddings,
//! term-overlap reranking, and generation disabled.
//!
//! ```toml
//! [chunking]
//! chunk_size = 500
//! chunk_overlap = 50
//!
//! [retrieval]
//! top_k_retrieval = 10
//! top_k_rerank = 5
//! hybrid_alpha = 0.7
//! dense_distance_metric = "l2"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [generation]
//! provider = "openai"
//! model = "gpt-4o"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [corpus]
//! root = "./docs"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fusion_rag_core::chunk::MarkdownSegmenter;
use fusion_rag_core::dense::DistanceMetric;
use fusion_rag_core::lexical::Bm25Params;
use fusion_rag_core::{PipelineConfig, RetrieverOptions};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k_retrieval")]
    pub top_k_retrieval: usize,
    #[serde(default = "default_top_k_rerank")]
    pub top_k_rerank: usize,
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default)]
    pub dense_distance_metric: DistanceMetric,
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f64,
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f64,
    #[serde(default = "default_rerank_batch_size")]
    pub rerank_batch_size: usize,
    #[serde(default)]
    pub pipeline_timeout_secs: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_retrieval: default_top_k_retrieval(),
            top_k_rerank: default_top_k_rerank(),
            hybrid_alpha: default_hybrid_alpha(),
            dense_distance_metric: DistanceMetric::default(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
            rerank_batch_size: default_rerank_batch_size(),
            pipeline_timeout_secs: None,
        }
    }
}

fn default_top_k_retrieval() -> usize {
    10
}
fn default_top_k_rerank() -> usize {
    5
}
fn default_hybrid_alpha() -> f64 {
    0.7
}
fn default_bm25_k1() -> f64 {
    1.5
}
fn default_bm25_b() -> f64 {
    0.75
}
fn default_rerank_batch_size() -> usize {
    16
}

impl RetrievalConfig {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            top_k_retrieval: self.top_k_retrieval,
            top_k_rerank: self.top_k_rerank,
            hybrid_alpha: self.hybrid_alpha,
            timeout: self.pipeline_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn retriever_options(&self, embed_batch_size: usize) -> RetrieverOptions {
        RetrieverOptions {
            metric: self.dense_distance_metric,
            bm25: Bm25Params {
                k1: self.bm25_k1,
                b: self.bm25_b,
            },
            embed_batch_size,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for `ollama` (default `http://localhost:11434`) or an
    /// OpenAI-compatible endpoint (default `https://api.openai.com`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hashing".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankerConfig {
    #[serde(default = "default_reranker_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: default_reranker_provider(),
            model: None,
        }
    }
}

fn default_reranker_provider() -> String {
    "overlap".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            temperature: 0.0,
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_generation_retries() -> u32 {
    3
}
fn default_generation_timeout_secs() -> u64 {
    60
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: None,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

impl Config {
    /// All defaults. Works without network access or model downloads.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        MarkdownSegmenter::new(self.chunking.chunk_size, self.chunking.chunk_overlap)
            .with_context(|| "Invalid [chunking] section")?;

        self.retrieval
            .pipeline_config()
            .validate()
            .with_context(|| "Invalid [retrieval] section")?;
        if self.retrieval.bm25_k1 < 0.0 {
            bail!("retrieval.bm25_k1 must be >= 0");
        }
        if !(0.0..=1.0).contains(&self.retrieval.bm25_b) {
            bail!("retrieval.bm25_b must be in [0.0, 1.0]");
        }

        match self.embedding.provider.as_str() {
            "hashing" | "local" => {
                if self.embedding.dims == Some(0) {
                    bail!("embedding.dims must be > 0");
                }
            }
            "openai" | "ollama" => {
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be hashing, openai, ollama, or local.",
                other
            ),
        }

        match self.reranker.provider.as_str() {
            "overlap" | "local" => {}
            other => bail!(
                "Unknown reranker provider: '{}'. Must be overlap or local.",
                other
            ),
        }

        match self.generation.provider.as_str() {
            "disabled" => {}
            "openai" | "ollama" => {
                if self.generation.model.is_none() {
                    bail!(
                        "generation.model must be specified when provider is '{}'",
                        self.generation.provider
                    );
                }
            }
            other => bail!(
                "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
