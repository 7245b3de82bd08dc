//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, active generation, chunk count |
//! | `POST` | `/ingest` | Segment and index one document |
//! | `POST` | `/query`  | Retrieve → rerank → generate |
//! | `POST` | `/search` | Hybrid search only, with per-request `k` / `alpha` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "generation_failed", "message": "...", "stage": "generate" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `index_not_ready` | 503 |
//! | `embedding_failed`, `retrieval_failed`, `rerank_failed`, `generation_failed` | 502 |
//! | `timeout` | 504 |
//! | `internal` | 500 |
//!
//! `stage` is present only for `/query` failures.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use fusion_rag_core::{PipelineError, Stage};

use crate::config::Config;
use crate::models::{
    ContextDocument, HealthResponse, IngestRequest, IngestResponse, QueryRequest, QueryResponse,
    SearchHit, SearchRequest, SearchResponse,
};
use crate::service::RagService;

#[derive(Clone)]
struct AppState {
    service: Arc<RagService>,
}

/// Build the service from `config`, index `[corpus].root`, and serve on
/// `[server].bind` until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(RagService::from_config(config)?);
    let report = service.load_corpus().await?;
    info!(
        chunks = report.total_chunks,
        generation = report.generation,
        "corpus loaded"
    );

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on http://{}", bind_addr);
    axum::serve(listener, router(service)).await?;

    Ok(())
}

pub fn router(service: Arc<RagService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ingest", post(handle_ingest))
        .route("/query", post(handle_query))
        .route("/search", post(handle_search))
        .layer(cors)
        .with_state(AppState { service })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<Stage>,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    stage: Option<Stage>,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            stage: None,
        }
    }

    fn at(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
                stage: self.stage,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn internal(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Map a core error; `upstream_code` is used for capability failures.
fn classify_core(err: &fusion_rag_core::Error, upstream_code: &'static str) -> AppError {
    use fusion_rag_core::Error;
    let message = err.to_string();
    match err {
        Error::InvalidParameter { .. } => bad_request(message),
        Error::IndexNotReady | Error::EmptyCorpus | Error::GenerationMismatch { .. } => {
            AppError::new(StatusCode::SERVICE_UNAVAILABLE, "index_not_ready", message)
        }
        Error::Embedding(_) => AppError::new(StatusCode::BAD_GATEWAY, "embedding_failed", message),
        Error::DimensionMismatch { .. } | Error::Scoring(_) => {
            AppError::new(StatusCode::BAD_GATEWAY, upstream_code, message)
        }
    }
}

fn classify_pipeline(err: &PipelineError) -> AppError {
    let stage = err.stage();
    let mapped = match err {
        PipelineError::Retrieval(e) => classify_core(e, "retrieval_failed"),
        PipelineError::Rerank(e) => classify_core(e, "rerank_failed"),
        PipelineError::Generation(e) => {
            AppError::new(StatusCode::BAD_GATEWAY, "generation_failed", format!("{:#}", e))
        }
        PipelineError::TimedOut { .. } => {
            AppError::new(StatusCode::GATEWAY_TIMEOUT, "timeout", err.to_string())
        }
    };
    mapped.at(stage)
}

fn classify_ingest(err: &anyhow::Error) -> AppError {
    match err.downcast_ref::<fusion_rag_core::Error>() {
        Some(core) => classify_core(core, "internal"),
        None => internal(format!("{:#}", err)),
    }
}

// ============ GET /health ============

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        generation: state.service.generation(),
        total_chunks: state.service.ingestion().total_chunks(),
    })
}

// ============ POST /ingest ============

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    if req.filename.trim().is_empty() {
        return Err(bad_request("filename must not be empty"));
    }

    let report = state
        .service
        .ingestion()
        .ingest_document(&req.text, &req.filename, &req.document_type)
        .await
        .map_err(|e| classify_ingest(&e))?;

    Ok(Json(IngestResponse {
        message: format!("Successfully ingested {}", req.filename),
        chunks_created: report.chunks_created,
        total_documents_in_index: report.total_chunks,
        generation: report.generation,
    }))
}

// ============ POST /query ============

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let started = Instant::now();
    let output = state
        .service
        .run_pipeline(&req.question)
        .await
        .map_err(|e| classify_pipeline(&e))?;

    Ok(Json(QueryResponse {
        request_id: output.request_id,
        question: output.question,
        answer: output.answer,
        context_used: output
            .documents
            .into_iter()
            .map(ContextDocument::from)
            .collect(),
        latency_seconds: started.elapsed().as_secs_f64(),
    }))
}

// ============ POST /search ============

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = state
        .service
        .hybrid_search(&req.query, req.k, req.alpha)
        .await
        .map_err(|e| classify_core(&e, "retrieval_failed"))?;

    Ok(Json(SearchResponse {
        generation: state.service.generation(),
        results: results.into_iter().map(SearchHit::from).collect(),
    }))
}
