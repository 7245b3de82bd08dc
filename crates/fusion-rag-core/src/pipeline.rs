//! Retrieve → rerank → generate orchestration.
//!
//! The [`Orchestrator`] holds only shared handles (retriever, reranker,
//! generator) and configuration. Each call to [`Orchestrator::run`] gets
//! its own [`PipelineContext`], so one orchestrator serves any number of
//! concurrent requests and never needs rebuilding when the corpus changes:
//! the retriever always reads whatever generation is active.
//!
//! Stages run strictly in order. A failure in any stage aborts the run;
//! there is no fallback to unreranked results and no partial answer. An
//! optional timeout is checked between stages, never mid-stage.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::capability::Generator;
use crate::error::{Error, PipelineError, Result};
use crate::fusion::HybridRetriever;
use crate::models::Chunk;
use crate::rerank::Reranker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Retrieve,
    Rerank,
    Generate,
    Done,
}

impl Stage {
    pub fn next(self) -> Stage {
        match self {
            Stage::Retrieve => Stage::Rerank,
            Stage::Rerank => Stage::Generate,
            Stage::Generate | Stage::Done => Stage::Done,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Retrieve => "retrieve",
            Stage::Rerank => "rerank",
            Stage::Generate => "generate",
            Stage::Done => "done",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// `k` passed to hybrid search.
    pub top_k_retrieval: usize,
    /// `top_n` passed to the reranker.
    pub top_k_rerank: usize,
    pub hybrid_alpha: f64,
    /// Whole-pipeline budget, checked at stage boundaries.
    pub timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k_retrieval: 10,
            top_k_rerank: 5,
            hybrid_alpha: 0.7,
            timeout: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k_retrieval == 0 {
            return Err(Error::invalid("top_k_retrieval", "must be at least 1"));
        }
        if self.top_k_rerank == 0 || self.top_k_rerank > self.top_k_retrieval {
            return Err(Error::invalid(
                "top_k_rerank",
                format!(
                    "must be between 1 and top_k_retrieval ({}), got {}",
                    self.top_k_retrieval, self.top_k_rerank
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.hybrid_alpha) {
            return Err(Error::invalid(
                "hybrid_alpha",
                format!("must be within [0.0, 1.0], got {}", self.hybrid_alpha),
            ));
        }
        Ok(())
    }
}

/// Per-request state threaded through the stages.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub request_id: Uuid,
    pub stage: Stage,
    pub question: String,
    pub documents: Vec<Chunk>,
    pub answer: Option<String>,
}

impl PipelineContext {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            stage: Stage::Retrieve,
            question: question.into(),
            documents: Vec::new(),
            answer: None,
        }
    }
}

/// A completed pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub request_id: Uuid,
    pub question: String,
    pub answer: String,
    pub documents: Vec<Chunk>,
}

/// Join chunk contents with a blank line, preserving order.
pub fn assemble_context(documents: &[Chunk]) -> String {
    documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct Orchestrator {
    retriever: Arc<HybridRetriever>,
    reranker: Reranker,
    generator: Arc<dyn Generator>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        reranker: Reranker,
        generator: Arc<dyn Generator>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            retriever,
            reranker,
            generator,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever> {
        &self.retriever
    }

    /// Run all three stages for `question`.
    #[instrument(skip_all, fields(question_len = question.len()))]
    pub async fn run(&self, question: &str) -> std::result::Result<PipelineOutput, PipelineError> {
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        let mut ctx = PipelineContext::new(question);

        while ctx.stage != Stage::Done {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(PipelineError::TimedOut { stage: ctx.stage });
            }
            debug!(
                request_id = %ctx.request_id,
                stage = %ctx.stage,
                documents = ctx.documents.len(),
                "entering stage"
            );
            self.step(&mut ctx).await?;
            ctx.stage = ctx.stage.next();
        }

        debug!(
            request_id = %ctx.request_id,
            documents = ctx.documents.len(),
            "pipeline done"
        );
        Ok(PipelineOutput {
            request_id: ctx.request_id,
            question: ctx.question,
            answer: ctx.answer.unwrap_or_default(),
            documents: ctx.documents,
        })
    }

    /// Execute the current stage of `ctx` without advancing it.
    async fn step(&self, ctx: &mut PipelineContext) -> std::result::Result<(), PipelineError> {
        match ctx.stage {
            Stage::Retrieve => {
                let results = self
                    .retriever
                    .hybrid_search(
                        &ctx.question,
                        self.config.top_k_retrieval,
                        self.config.hybrid_alpha,
                    )
                    .await
                    .map_err(PipelineError::Retrieval)?;
                ctx.documents = results.into_iter().map(|c| c.chunk).collect();
            }
            Stage::Rerank => {
                let candidates = std::mem::take(&mut ctx.documents);
                ctx.documents = self
                    .reranker
                    .rerank(&ctx.question, candidates, self.config.top_k_rerank)
                    .await
                    .map_err(PipelineError::Rerank)?;
            }
            Stage::Generate => {
                let context = assemble_context(&ctx.documents);
                let answer = self
                    .generator
                    .generate(&ctx.question, &context)
                    .await
                    .map_err(PipelineError::Generation)?;
                ctx.answer = Some(answer);
            }
            Stage::Done => {}
        }
        Ok(())
    }
}
