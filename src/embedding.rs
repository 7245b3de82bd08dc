//! Embedding provider implementations.
//!
//! Concrete backends for the core [`EmbeddingProvider`] trait:
//! - **`hashing`**: the core [`HashingEmbedder`]; offline and deterministic.
//! - **[`OpenAIEmbedder`]**: `POST /v1/embeddings` with batching, retry, and backoff.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`**: fastembed models run in-process (`local-models` feature).
//!
//! Use [`create_embedder`] to build the provider named in `[embedding]`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use fusion_rag_core::embedding::{EmbeddingProvider, HashingEmbedder};

use crate::config::EmbeddingConfig;
use crate::http::{self, RetryPolicy};

const DEFAULT_HASHING_DIMS: usize = 384;
const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";

// ============ OpenAI ============

/// Embedding provider using the OpenAI API (or any compatible endpoint).
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
    retry: RetryPolicy,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let base = config.url.as_deref().unwrap_or(OPENAI_URL);

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            endpoint: format!("{}/v1/embeddings", base.trim_end_matches('/')),
            api_key: api_key.into(),
            model,
            dims,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(
            &self.client,
            &self.endpoint,
            Some(&self.api_key),
            &body,
            self.retry,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, to_f32_vec(embedding)?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dims: usize,
    retry: RetryPolicy,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or(OLLAMA_URL);

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            endpoint: format!("{}/api/embed", base.trim_end_matches('/')),
            model,
            dims,
            retry: RetryPolicy::new(config.max_retries),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json =
            http::post_json(&self.client, &self.endpoint, None, &body, self.retry, "Ollama").await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            let values = embedding.as_array().ok_or_else(|| {
                anyhow::anyhow!("Invalid Ollama response: embedding is not an array")
            })?;
            to_f32_vec(values)
        })
        .collect()
}

fn to_f32_vec(values: &[serde_json::Value]) -> Result<Vec<f32>> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow::anyhow!("Invalid embedding value: {}", v))
        })
        .collect()
}

// ============ Local (fastembed) ============

#[cfg(feature = "local-models")]
pub use local::LocalEmbedder;

#[cfg(feature = "local-models")]
mod local {
    use super::*;
    use parking_lot::Mutex;

    /// Runs a fastembed model in-process.
    ///
    /// The model is downloaded from Hugging Face on first use and cached.
    /// Inference runs on the blocking thread pool.
    pub struct LocalEmbedder {
        model_name: String,
        dims: usize,
        batch_size: usize,
        model: Arc<Mutex<fastembed::TextEmbedding>>,
    }

    impl LocalEmbedder {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
            let (fastembed_model, default_dims) = resolve_model(&model_name)?;
            let model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

            Ok(Self {
                model_name,
                dims: config.dims.unwrap_or(default_dims),
                batch_size: config.batch_size,
                model: Arc::new(Mutex::new(model)),
            })
        }
    }

    fn resolve_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
        use fastembed::EmbeddingModel as M;
        match name {
            "all-minilm-l6-v2" => Ok((M::AllMiniLML6V2, 384)),
            "bge-small-en-v1.5" => Ok((M::BGESmallENV15, 384)),
            "bge-base-en-v1.5" => Ok((M::BGEBaseENV15, 768)),
            "bge-large-en-v1.5" => Ok((M::BGELargeENV15, 1024)),
            "nomic-embed-text-v1.5" => Ok((M::NomicEmbedTextV15, 768)),
            "multilingual-e5-small" => Ok((M::MultilingualE5Small, 384)),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
                 nomic-embed-text-v1.5, multilingual-e5-small",
                other
            ),
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LocalEmbedder {
        fn model_name(&self) -> &str {
            &self.model_name
        }

        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let model = self.model.clone();
            let texts = texts.to_vec();
            let batch_size = self.batch_size;
            tokio::task::spawn_blocking(move || {
                let mut model = model.lock();
                model
                    .embed(texts, Some(batch_size))
                    .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
            })
            .await?
        }
    }
}

/// Create the embedding provider named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"hashing"` | core `HashingEmbedder` (`dims` default 384) |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (requires the `local-models` feature) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(
            config.dims.unwrap_or(DEFAULT_HASHING_DIMS),
        ))),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-models")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-models"))]
        "local" => bail!("Local embedding provider requires --features local-models"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_openai_rejects_malformed() {
        assert!(parse_openai_response(&serde_json::json!({})).is_err());
        assert!(parse_openai_response(&serde_json::json!({ "data": [{ "index": 0 }] })).is_err());
        assert!(parse_openai_response(
            &serde_json::json!({ "data": [{ "embedding": ["x"] }] })
        )
        .is_err());
    }

    #[test]
    fn test_parse_ollama() {
        let json = serde_json::json!({ "embeddings": [[0.5, 0.25], [1.0, 0.0]] });
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.5, 0.25]);
        assert!(parse_ollama_response(&serde_json::json!({ "embeddings": [1.0] })).is_err());
    }

    #[test]
    fn test_create_hashing_default_dims() {
        let provider = create_embedder(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.model_name(), HashingEmbedder::MODEL_NAME);
        assert_eq!(provider.dims(), DEFAULT_HASHING_DIMS);
    }

    #[test]
    fn test_create_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "word2vec".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).is_err());
    }

    #[test]
    fn test_openai_requires_model_and_dims() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(OpenAIEmbedder::with_api_key(&config, "sk-test").is_err());

        let config = EmbeddingConfig {
            model: Some("text-embedding-3-small".to_string()),
            dims: Some(1536),
            ..config
        };
        let provider = OpenAIEmbedder::with_api_key(&config, "sk-test").unwrap();
        assert_eq!(provider.model_name(), "text-embedding-3-small");
        assert_eq!(provider.dims(), 1536);
    }
}
