//! Pairwise scorer providers for the reranking stage.
//!
//! - **`overlap`**: core `TermOverlapScorer`; offline and deterministic.
//! - **`local`**: a fastembed cross-encoder (`local-models` feature),
//!   default model `bge-reranker-base`.

use anyhow::{bail, Result};
use std::sync::Arc;

use fusion_rag_core::capability::{CrossScorer, TermOverlapScorer};

use crate::config::RerankerConfig;

#[cfg(feature = "local-models")]
pub use local::LocalCrossEncoder;

#[cfg(feature = "local-models")]
mod local {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Cross-encoder reranker run in-process through fastembed `TextRerank`.
    pub struct LocalCrossEncoder {
        model_name: String,
        model: Arc<Mutex<fastembed::TextRerank>>,
    }

    impl LocalCrossEncoder {
        pub fn new(config: &RerankerConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| "bge-reranker-base".to_string());
            let model = fastembed::TextRerank::try_new(
                fastembed::RerankInitOptions::new(resolve_model(&model_name)?)
                    .with_show_download_progress(true),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize reranker model: {}", e))?;
            Ok(Self {
                model_name,
                model: Arc::new(Mutex::new(model)),
            })
        }
    }

    fn resolve_model(name: &str) -> Result<fastembed::RerankerModel> {
        match name {
            "bge-reranker-base" => Ok(fastembed::RerankerModel::BGERerankerBase),
            "jina-reranker-v1-turbo-en" => Ok(fastembed::RerankerModel::JINARerankerV1TurboEn),
            other => bail!(
                "Unknown local reranker model: '{}'. Supported models: \
                 bge-reranker-base, jina-reranker-v1-turbo-en",
                other
            ),
        }
    }

    #[async_trait]
    impl CrossScorer for LocalCrossEncoder {
        fn model_name(&self) -> &str {
            &self.model_name
        }

        async fn cross_score(&self, query: &str, text: &str) -> Result<f32> {
            let scores = self.cross_score_batch(query, &[text.to_string()]).await?;
            scores
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("Empty reranker response"))
        }

        async fn cross_score_batch(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
            let model = self.model.clone();
            let query = query.to_string();
            let texts = texts.to_vec();
            tokio::task::spawn_blocking(move || {
                let mut model = model.lock();
                let documents: Vec<&str> = texts.iter().map(String::as_str).collect();
                let results = model
                    .rerank(query.as_str(), &documents, false, None)
                    .map_err(|e| anyhow::anyhow!("Local reranking failed: {}", e))?;
                // Results come back sorted by score; restore input order.
                let mut scores = vec![f32::NAN; documents.len()];
                for r in results {
                    if let Some(slot) = scores.get_mut(r.index) {
                        *slot = r.score;
                    }
                }
                Ok(scores)
            })
            .await?
        }
    }
}

pub fn create_scorer(config: &RerankerConfig) -> Result<Arc<dyn CrossScorer>> {
    match config.provider.as_str() {
        "overlap" => Ok(Arc::new(TermOverlapScorer)),
        #[cfg(feature = "local-models")]
        "local" => Ok(Arc::new(LocalCrossEncoder::new(config)?)),
        #[cfg(not(feature = "local-models"))]
        "local" => bail!("Local reranker requires --features local-models"),
        other => bail!("Unknown reranker provider: {}", other),
    }
}
