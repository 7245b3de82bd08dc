//! Error taxonomy for the retrieval core.
//!
//! [`Error`] covers precondition and capability failures raised by the
//! indices, the fusion engine, and the reranker. [`PipelineError`] is what
//! [`Orchestrator::run`](crate::pipeline::Orchestrator::run) returns: every
//! variant names the stage that failed, and none of them carries a partial
//! answer.

use thiserror::Error;

use crate::pipeline::Stage;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Caller bug: bad `k`, `alpha`, `top_n`, or malformed input. Never retried.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// No generation has been published yet.
    #[error("index not ready: build_indices has not completed")]
    IndexNotReady,

    /// A lexical index was asked to build over zero chunks.
    #[error("cannot build an index over an empty corpus")]
    EmptyCorpus,

    /// Parts of an index generation disagree about which generation they belong to.
    #[error("generation mismatch: {component} is generation {found}, expected {expected}")]
    GenerationMismatch {
        component: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("vector dimension mismatch: index has {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// The embedding capability failed or returned malformed output.
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    /// The pairwise scoring capability failed or returned malformed output.
    #[error("scoring failed: {0:#}")]
    Scoring(anyhow::Error),
}

impl Error {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// True for errors caused by the caller rather than by index state or a capability.
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, Error::InvalidParameter { .. })
    }

    /// True when the indices were not in a queryable state.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            Error::IndexNotReady | Error::EmptyCorpus | Error::GenerationMismatch { .. }
        )
    }
}

/// A pipeline failure, tagged with the stage that produced it.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("retrieve stage failed: {0}")]
    Retrieval(#[source] Error),

    #[error("rerank stage failed: {0}")]
    Rerank(#[source] Error),

    #[error("generate stage failed: {0:#}")]
    Generation(#[source] anyhow::Error),

    /// The deadline passed before `stage` could start.
    #[error("pipeline timed out before the {stage} stage")]
    TimedOut { stage: Stage },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Retrieval(_) => Stage::Retrieve,
            PipelineError::Rerank(_) => Stage::Rerank,
            PipelineError::Generation(_) => Stage::Generate,
            PipelineError::TimedOut { stage } => *stage,
        }
    }
}
