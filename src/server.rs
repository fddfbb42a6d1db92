//! HTTP API for chat frontends.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/embeddings` | Embed `{ text }` |
//! | `POST` | `/api/rag/search` | Search a corpus sent in the request body |
//! | `POST` | `/api/rag/query` | Search the server's own store |
//! | `POST` | `/api/rag/context` | Build a chat prompt context from the store |
//! | `GET`  | `/api/documents` | List stored documents |
//! | `POST` | `/api/documents` | Ingest `{ filename, content | contentBase64 }` |
//! | `DELETE` | `/api/documents/{id}` | Delete a document and its chunks |
//!
//! # Error Contract
//!
//! Every error response is a flat JSON object:
//!
//! ```json
//! { "error": "bad_request", "message": "query is required and must be a string" }
//! ```
//!
//! Malformed requests are always 4xx; only failures inside the server are
//! 500.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::Engine;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use docrag_core::document::ExtractError;
use docrag_core::embedding::EmbeddingSource;
use docrag_core::models::{Document, DocumentChunk, RagContext};
use docrag_core::search::{search, Corpus};

use crate::config::Config;
use crate::service::RagService;

/// Largest accepted request body (uploads arrive inline as JSON).
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    service: Arc<RagService>,
}

/// Build the router over an existing service.
pub fn router(service: Arc<RagService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/embeddings", post(handle_embeddings))
        .route("/api/rag/search", post(handle_rag_search))
        .route("/api/rag/query", post(handle_rag_query))
        .route("/api/rag/context", post(handle_rag_context))
        .route("/api/documents", get(handle_list_documents).post(handle_add_document))
        .route("/api/documents/{id}", delete(handle_delete_document))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { service })
}

/// Serve on an already bound listener until the process is terminated.
pub async fn serve(listener: tokio::net::TcpListener, service: Arc<RagService>) -> anyhow::Result<()> {
    axum::serve(listener, router(service)).await?;
    Ok(())
}

/// Starts the HTTP server on `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(RagService::from_config(config).await?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;

    info!(bind = %config.server.bind, backend = ?config.store.backend, "server listening");
    println!("docrag server listening on http://{}", config.server.bind);

    serve(listener, service).await
}

// ============ Error response ============

/// JSON error body: a short machine-readable label and a detail message.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

/// Constructs a 500 error and logs its cause.
fn internal(context: &str, err: anyhow::Error) -> AppError {
    error!(error = %format!("{:#}", err), "{}", context);
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{}: {:#}", context, err),
    }
}

/// Unwrap a JSON body, turning syntax and content-type errors into 400s.
fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| bad_request(format!("invalid JSON body: {}", e.body_text())))
}

fn required_str<'a>(body: &'a Value, field: &str) -> Result<&'a str, AppError> {
    body.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| bad_request(format!("{} is required and must be a string", field)))
}

fn optional_count(body: &Value, field: &str) -> Result<Option<usize>, AppError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .filter(|n| *n > 0)
            .map(|n| Some(n as usize))
            .ok_or_else(|| bad_request(format!("{} must be a positive integer", field))),
    }
}

fn optional_list<T: serde::de::DeserializeOwned>(body: &Value, field: &str) -> Result<Vec<T>, AppError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| bad_request(format!("invalid {}: {}", field, e))),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/embeddings ============

#[derive(Serialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
    dimension: usize,
    source: EmbeddingSource,
}

/// Embeds `{ text }` with the configured chain. The local fallback makes
/// this succeed even when no provider is reachable.
async fn handle_embeddings(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<EmbeddingResponse>, AppError> {
    let body = json_body(payload)?;
    let text = required_str(&body, "text")?;
    if text.is_empty() {
        return Err(bad_request("text must not be empty"));
    }

    let embedding = state
        .service
        .embed(text)
        .await
        .map_err(|e| internal("Embedding generation failed", e))?;

    Ok(Json(EmbeddingResponse {
        dimension: embedding.vector.len(),
        embedding: embedding.vector,
        source: embedding.source,
    }))
}

// ============ POST /api/rag/search ============

/// Searches a corpus supplied by the client (`documents`, `chunks`).
///
/// A missing or empty corpus yields an empty result with status 200.
async fn handle_rag_search(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<RagContext>, AppError> {
    let body = json_body(payload)?;
    let query = required_str(&body, "query")?;
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let top_k = optional_count(&body, "topK")?.unwrap_or(state.service.default_top_k());
    let documents: Vec<Document> = optional_list(&body, "documents")?;
    let chunks: Vec<DocumentChunk> = optional_list(&body, "chunks")?;

    let corpus = Corpus::new(documents, chunks);
    let ctx = search(state.service.embedder(), query, &corpus, top_k).await;
    Ok(Json(ctx))
}

// ============ POST /api/rag/query ============

async fn handle_rag_query(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<RagContext>, AppError> {
    let body = json_body(payload)?;
    let query = required_str(&body, "query")?;
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let top_k = optional_count(&body, "topK")?;

    Ok(Json(state.service.search(query, top_k).await))
}

// ============ POST /api/rag/context ============

async fn handle_rag_context(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let body = json_body(payload)?;
    let query = required_str(&body, "query")?;
    let max_results = optional_count(&body, "maxResults")?;

    let context = state.service.chat_context(query, max_results).await;
    Ok(Json(json!({ "query": query, "context": context })))
}

// ============ /api/documents ============

async fn handle_list_documents(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let documents = state
        .service
        .list_documents()
        .await
        .map_err(|e| internal("Failed to list documents", e))?;
    Ok(Json(json!({ "count": documents.len(), "documents": documents })))
}

/// Ingests an upload sent inline as text (`content`) or base64
/// (`contentBase64`).
async fn handle_add_document(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let body = json_body(payload)?;
    let filename = required_str(&body, "filename")?;
    if filename.trim().is_empty() {
        return Err(bad_request("filename must not be empty"));
    }

    let bytes = match (body.get("content"), body.get("contentBase64")) {
        (Some(Value::String(text)), _) => text.as_bytes().to_vec(),
        (_, Some(Value::String(encoded))) => base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| bad_request(format!("contentBase64 is not valid base64: {}", e)))?,
        _ => return Err(bad_request("content or contentBase64 is required")),
    };

    let report = match state.service.add_document(filename, &bytes).await {
        Ok(report) => report,
        Err(e) if e.downcast_ref::<ExtractError>().is_some() => {
            return Err(bad_request(e.to_string()))
        }
        Err(e) => return Err(internal("Failed to store document", e)),
    };

    let document = state
        .service
        .get_document(&report.document_id)
        .await
        .map_err(|e| internal("Failed to read stored document", e))?;

    Ok(Json(json!({
        "success": true,
        "document": document,
        "report": report,
    })))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let deleted = state
        .service
        .delete_document(&id)
        .await
        .map_err(|e| internal("Failed to delete document", e))?;
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}
