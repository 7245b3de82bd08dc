//! Composition root: wires providers, the retriever, the reranker, the
//! orchestrator, and ingestion from a [`Config`].

use anyhow::Result;
use std::sync::Arc;

use fusion_rag_core::capability::{CrossScorer, Generator};
use fusion_rag_core::chunk::MarkdownSegmenter;
use fusion_rag_core::embedding::EmbeddingProvider;
use fusion_rag_core::{
    HybridRetriever, Orchestrator, PipelineError, PipelineOutput, Reranker, ScoredCandidate,
};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generate::create_generator;
use crate::ingest::{scan_directory, IngestionPipeline};
use crate::models::IngestReport;
use crate::rerank::create_scorer;

pub struct RagService {
    config: Config,
    retriever: Arc<HybridRetriever>,
    orchestrator: Orchestrator,
    ingestion: IngestionPipeline,
}

impl RagService {
    /// Build every provider named in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_providers(
            config,
            create_embedder(&config.embedding)?,
            create_scorer(&config.reranker)?,
            create_generator(&config.generation)?,
        )
    }

    /// Build the service around explicit providers.
    pub fn with_providers(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        scorer: Arc<dyn CrossScorer>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        config.validate()?;

        let retriever = Arc::new(HybridRetriever::new(
            embedder,
            config
                .retrieval
                .retriever_options(config.embedding.batch_size),
        ));
        let reranker = Reranker::new(scorer, config.retrieval.rerank_batch_size);
        let orchestrator = Orchestrator::new(
            retriever.clone(),
            reranker,
            generator,
            config.retrieval.pipeline_config(),
        )?;
        let segmenter =
            MarkdownSegmenter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        let ingestion = IngestionPipeline::new(retriever.clone(), segmenter);

        Ok(Self {
            config: config.clone(),
            retriever,
            orchestrator,
            ingestion,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever> {
        &self.retriever
    }

    pub fn ingestion(&self) -> &IngestionPipeline {
        &self.ingestion
    }

    /// Index `[corpus].root` if one is configured.
    ///
    /// Without a root, an empty generation is published so the service
    /// answers queries (with no context) instead of reporting not-ready.
    pub async fn load_corpus(&self) -> Result<IngestReport> {
        let documents = match self.config.corpus.root {
            Some(_) => scan_directory(&self.config.corpus, "general")?,
            None => Vec::new(),
        };
        self.ingestion.ingest_batch(&documents).await
    }

    /// Hybrid search with per-request overrides for `k` and `alpha`.
    pub async fn hybrid_search(
        &self,
        query: &str,
        k: Option<usize>,
        alpha: Option<f64>,
    ) -> fusion_rag_core::Result<Vec<ScoredCandidate>> {
        let pipeline = self.orchestrator.config();
        self.retriever
            .hybrid_search(
                query,
                k.unwrap_or(pipeline.top_k_retrieval),
                alpha.unwrap_or(pipeline.hybrid_alpha),
            )
            .await
    }

    pub async fn run_pipeline(&self, question: &str) -> Result<PipelineOutput, PipelineError> {
        self.orchestrator.run(question).await
    }

    pub fn generation(&self) -> Option<u64> {
        self.retriever.current_generation()
    }
}
