//! HTTP surface over the ingestion and query pipelines.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::documents::DocumentStore;
use crate::ingest::{ChunkFailure, Ingestor};
use crate::query::{AnswerResult, QueryPipeline};
use crate::throttle::RequestLimiter;
use crate::RagError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    store: Arc<DocumentStore>,
    ingestor: Arc<Ingestor>,
    query: Arc<QueryPipeline>,
    chunk_size: usize,
    ingest_lock: Arc<Mutex<()>>,
    rate_limiter: Option<RequestLimiter>,
}

impl AppState {
    /// Bundles the pipelines for the router.
    pub fn new(
        store: Arc<DocumentStore>,
        ingestor: Arc<Ingestor>,
        query: Arc<QueryPipeline>,
        chunk_size: usize,
    ) -> Self {
        Self {
            store,
            ingestor,
            query,
            chunk_size,
            ingest_lock: Arc::new(Mutex::new(())),
            rate_limiter: None,
        }
    }

    /// Caps `/query` throughput; `None` disables the cap.
    pub fn with_rate_limiter(mut self, limiter: Option<RequestLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/documents", get(list_documents))
        .route("/ingest", post(ingest_handler))
        .route("/query", post(query_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    retryable: bool,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error_response(status: StatusCode, message: impl Into<String>, retryable: bool) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
            retryable,
        }),
    )
}

fn rag_error_status(err: &RagError) -> StatusCode {
    match err {
        RagError::Validation(_) => StatusCode::BAD_REQUEST,
        RagError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentSummary {
    id: String,
    title: String,
    category: String,
    chunk_count: usize,
}

async fn list_documents(State(state): State<AppState>) -> Json<Vec<DocumentSummary>> {
    let summaries = state
        .store
        .documents()
        .iter()
        .map(|doc| DocumentSummary {
            id: doc.id.clone(),
            title: doc.title.clone(),
            category: doc.category.clone(),
            chunk_count: crate::documents::chunk_document(doc, state.chunk_size).len(),
        })
        .collect();
    Json(summaries)
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    success: bool,
    message: String,
    indexed: usize,
    total: usize,
    failures: Vec<ChunkFailure>,
}

#[derive(Debug, Serialize)]
struct IngestErrorBody {
    success: bool,
    error: String,
    retryable: bool,
}

async fn ingest_handler(State(state): State<AppState>) -> Response {
    let Ok(_guard) = state.ingest_lock.try_lock() else {
        warn!("rejecting ingest request; another run is in progress");
        return error_response(
            StatusCode::CONFLICT,
            "an ingestion run is already in progress",
            true,
        )
        .into_response();
    };

    match state.ingestor.ingest().await {
        Ok(report) => Json(IngestResponse {
            success: true,
            message: report.message(),
            indexed: report.indexed_count,
            total: report.total_count,
            failures: report.failures,
        })
        .into_response(),
        Err(err) => {
            error!(error = %err, "ingestion failed");
            let status = match err {
                RagError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(IngestErrorBody {
                    success: false,
                    error: err.to_string(),
                    retryable: err.is_retryable(),
                }),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    #[serde(default)]
    query: Option<String>,
}

async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<AnswerResult>, ApiError> {
    let question = match payload {
        Ok(Json(request)) => request.query.unwrap_or_default(),
        Err(rejection) => {
            debug!(error = %rejection, "rejecting malformed query body");
            String::new()
        }
    };
    if question.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Query is required",
            false,
        ));
    }
    if let Some(limiter) = &state.rate_limiter {
        if !limiter.try_acquire() {
            return Err(error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "rate limit exceeded",
                true,
            ));
        }
    }

    match state.query.answer_query(&question).await {
        Ok(result) => {
            info!(
                sources = result.sources.len(),
                outcome = ?result.outcome,
                "answered query"
            );
            Ok(Json(result))
        }
        Err(err) => {
            error!(error = %err, "query failed");
            Err(error_response(
                rag_error_status(&err),
                err.to_string(),
                err.is_retryable(),
            ))
        }
    }
}
