//! Core data types shared by the indices, fusion, reranking, and pipeline.
//!
//! A [`Chunk`] is the unit of retrieval. Its `ordinal_id` is its position in
//! the [`CorpusStore`](crate::corpus::CorpusStore) of one index generation and
//! is reassigned whenever the corpus is rebuilt.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Metadata key every chunk must carry.
pub const SOURCE_KEY: &str = "source";

/// A metadata value: string, number, or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Number(f64),
    Null,
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Number(n)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Number(n as f64)
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Text(s) => f.write_str(s),
            MetadataValue::Number(n) => write!(f, "{}", n),
            MetadataValue::Null => f.write_str("null"),
        }
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// An immutable unit of retrievable text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Position in the corpus of the generation this chunk was read from.
    pub ordinal_id: usize,
    pub content: String,
    pub metadata: Metadata,
    /// SHA-256 of `content`, lowercase hex.
    pub hash: String,
}

impl Chunk {
    /// Create a chunk that has not yet been placed in a corpus.
    ///
    /// Fails when `metadata` has no `source` entry. The `ordinal_id` is
    /// assigned by [`CorpusStore::build`](crate::corpus::CorpusStore::build).
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Result<Self> {
        if !metadata.contains_key(SOURCE_KEY) {
            return Err(Error::invalid(
                "metadata",
                "chunk metadata must include a `source` key",
            ));
        }
        let content = content.into();
        let hash = content_hash(&content);
        Ok(Self {
            ordinal_id: 0,
            content,
            metadata,
            hash,
        })
    }

    /// Convenience constructor with only a `source` entry.
    pub fn with_source(content: impl Into<String>, source: &str) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), MetadataValue::from(source));
        let content = content.into();
        let hash = content_hash(&content);
        Self {
            ordinal_id: 0,
            content,
            metadata,
            hash,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(MetadataValue::as_str)
    }
}

pub(crate) fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Which retrieval signal produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Dense,
    Sparse,
    Both,
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CandidateSource::Dense => "dense",
            CandidateSource::Sparse => "sparse",
            CandidateSource::Both => "both",
        })
    }
}

/// A chunk with its fused score for one query. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub chunk: Chunk,
    /// `alpha * dense_similarity + (1 - alpha) * sparse_score`.
    pub score: f64,
    /// Similarity in `[0, 1]` derived from the dense distance, if the chunk was a dense hit.
    pub dense_similarity: Option<f64>,
    /// Min-max normalized lexical score, if the chunk shared a term with the query.
    pub sparse_score: Option<f64>,
    pub source: CandidateSource,
    /// Index generation the candidate was read from.
    pub generation: u64,
}
