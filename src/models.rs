//! Request, response, and document types used by the service, HTTP API, and CLI.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fusion_rag_core::{CandidateSource, Chunk, Metadata, ScoredCandidate};

/// A document waiting to be segmented and indexed.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Recorded as the chunk `source` metadata.
    pub filename: String,
    pub doc_type: String,
    pub text: String,
}

/// Outcome of one ingestion commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub chunks_created: usize,
    pub total_chunks: usize,
    pub generation: u64,
}

fn default_document_type() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub text: String,
    pub filename: String,
    #[serde(default = "default_document_type")]
    pub document_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub message: String,
    pub chunks_created: usize,
    pub total_documents_in_index: usize,
    pub generation: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

/// One chunk handed to the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextDocument {
    pub page_content: String,
    pub metadata: Metadata,
}

impl From<Chunk> for ContextDocument {
    fn from(chunk: Chunk) -> Self {
        Self {
            page_content: chunk.content,
            metadata: chunk.metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub request_id: Uuid,
    pub question: String,
    pub answer: String,
    pub context_used: Vec<ContextDocument>,
    pub latency_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub alpha: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub ordinal_id: usize,
    pub score: f64,
    pub source: CandidateSource,
    pub dense_similarity: Option<f64>,
    pub sparse_score: Option<f64>,
    pub page_content: String,
    pub metadata: Metadata,
}

impl From<ScoredCandidate> for SearchHit {
    fn from(c: ScoredCandidate) -> Self {
        Self {
            ordinal_id: c.chunk.ordinal_id,
            score: c.score,
            source: c.source,
            dense_similarity: c.dense_similarity,
            sparse_score: c.sparse_score,
            page_content: c.chunk.content,
            metadata: c.chunk.metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub generation: Option<u64>,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub generation: Option<u64>,
    pub total_chunks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_request_default_type() {
        let req: IngestRequest =
            serde_json::from_str(r#"{"text": "hello", "filename": "a.md"}"#).unwrap();
        assert_eq!(req.document_type, "general");
    }

    #[test]
    fn test_search_hit_from_candidate() {
        let mut chunk = Chunk::with_source("body", "a.md");
        chunk.ordinal_id = 3;
        let hit = SearchHit::from(ScoredCandidate {
            chunk,
            score: 0.5,
            dense_similarity: Some(0.5),
            sparse_score: None,
            source: CandidateSource::Dense,
            generation: 2,
        });
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["ordinal_id"], 3);
        assert_eq!(json["source"], "dense");
        assert!(json["sparse_score"].is_null());
        assert_eq!(json["metadata"]["source"], "a.md");
    }
}
