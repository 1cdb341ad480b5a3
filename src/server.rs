//! JSON HTTP API over [`Services`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/documents` | Ingest extracted text |
//! | `PUT`    | `/users/{user}/documents/{doc}/content` | Upload a file; extract and ingest it |
//! | `GET`    | `/users/{user}/documents` | List indexed documents, newest first |
//! | `DELETE` | `/users/{user}/documents/{doc}` | Delete every record of a document |
//! | `GET`    | `/users/{user}/documents/{doc}/vectors` | Records of a document |
//! | `DELETE` | `/users/{user}/files/{file_name}` | Delete every document with that file name |
//! | `POST`   | `/projects/{project}/reconcile` | Repair attachment completion flags |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "not found: document 'd1' for user 'u1'" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `embeddings_disabled` | 400 |
//! | `unsupported_media_type` | 415 |
//! | `not_found` | 404 |
//! | `embedding_failed`, `vector_store_failed` | 502 |
//! | `dimension_mismatch`, `scan_ceiling_reached`, `relational` | 500 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use grant_index_core::ingest::{IngestReport, IngestRequest};
use grant_index_core::models::{DocumentIndexEntry, PageOffset, VectorMatch};
use grant_index_core::reconcile::ReconcileOutcome;
use grant_index_core::retrieval::DeleteReport;
use grant_index_core::IndexError;

use crate::config::Config;
use crate::extract::ExtractError;
use crate::services::{ServiceError, Services, Upload};

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Arc::new(Services::from_config(config).await?);
    if !services.embeddings_enabled() {
        tracing::warn!("embedding provider disabled; ingestion routes will return 400");
    }
    let app = build_router(services);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    println!("Grant index server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Router with every route and the CORS layer; state is the shared services.
pub fn build_router(services: Arc<Services>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", post(handle_ingest))
        .route(
            "/users/{user}/documents/{doc}/content",
            put(handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/users/{user}/documents", get(handle_list_documents))
        .route("/users/{user}/documents/{doc}", delete(handle_delete_document))
        .route("/users/{user}/documents/{doc}/vectors", get(handle_list_vectors))
        .route("/users/{user}/files/{file_name}", delete(handle_delete_file))
        .route("/projects/{project}/reconcile", post(handle_reconcile))
        .layer(cors)
        .with_state(services)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Stable code clients branch on; see the table above.
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::EmbeddingsDisabled => {
                AppError::new(StatusCode::BAD_REQUEST, "embeddings_disabled", message)
            }
            ServiceError::Extract(ExtractError::UnsupportedContentType(_)) => AppError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_media_type",
                message,
            ),
            ServiceError::Extract(_) => AppError::new(StatusCode::BAD_REQUEST, "bad_request", message),
            ServiceError::Index(e) => classify_index_error(&e, message),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::new(StatusCode::BAD_REQUEST, "bad_request", rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::new(StatusCode::BAD_REQUEST, "bad_request", rejection.body_text())
    }
}

fn classify_index_error(err: &IndexError, message: String) -> AppError {
    let (status, code) = match err {
        IndexError::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        IndexError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        IndexError::Embedding { .. } => (StatusCode::BAD_GATEWAY, "embedding_failed"),
        IndexError::VectorStore(_) => (StatusCode::BAD_GATEWAY, "vector_store_failed"),
        IndexError::DimensionMismatch { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "dimension_mismatch")
        }
        IndexError::CeilingReached { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "scan_ceiling_reached")
        }
        IndexError::Relational(_) => (StatusCode::INTERNAL_SERVER_ERROR, "relational"),
    };
    AppError::new(status, code, message)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    embeddings: bool,
}

async fn handle_health(State(services): State<Arc<Services>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        embeddings: services.embeddings_enabled(),
    })
}

// ============ Ingestion ============

/// `POST /documents` body. A missing `documentId` is generated.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestBody {
    user_id: String,
    #[serde(default)]
    document_id: Option<String>,
    file_name: String,
    file_type: String,
    text: String,
    #[serde(default)]
    pages: Vec<PageOffset>,
}

async fn handle_ingest(
    State(services): State<Arc<Services>>,
    body: Result<Json<IngestBody>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestReport>), AppError> {
    let Json(body) = body?;
    let request = IngestRequest {
        user_id: body.user_id,
        document_id: body
            .document_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        file_name: body.file_name,
        file_type: body.file_type,
        text: body.text,
        pages: body.pages,
    };
    let report = services.ingest(&request).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadQuery {
    file_name: String,
}

async fn handle_upload(
    State(services): State<Arc<Services>>,
    Path((user, doc)): Path<(String, String)>,
    query: Result<Query<UploadQuery>, QueryRejection>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<(StatusCode, Json<IngestReport>), AppError> {
    let Query(query) = query?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::new(StatusCode::BAD_REQUEST, "bad_request", "Content-Type header is required")
        })?;
    let report = services
        .ingest_upload(Upload {
            user_id: &user,
            document_id: &doc,
            file_name: &query.file_name,
            content_type,
            bytes: &bytes,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

// ============ Retrieval & deletion ============

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentIndexEntry>,
}

async fn handle_list_documents(
    State(services): State<Arc<Services>>,
    Path(user): Path<String>,
) -> Result<Json<DocumentsResponse>, AppError> {
    let documents = services.list_documents(&user).await?;
    Ok(Json(DocumentsResponse { documents }))
}

#[derive(Serialize)]
struct VectorsResponse {
    vectors: Vec<VectorMatch>,
}

async fn handle_list_vectors(
    State(services): State<Arc<Services>>,
    Path((user, doc)): Path<(String, String)>,
) -> Result<Json<VectorsResponse>, AppError> {
    let vectors = services.list_vectors(&user, &doc).await?;
    Ok(Json(VectorsResponse { vectors }))
}

async fn handle_delete_document(
    State(services): State<Arc<Services>>,
    Path((user, doc)): Path<(String, String)>,
) -> Result<Json<DeleteReport>, AppError> {
    Ok(Json(services.delete_document(&user, &doc).await?))
}

async fn handle_delete_file(
    State(services): State<Arc<Services>>,
    Path((user, file_name)): Path<(String, String)>,
) -> Result<Json<DeleteReport>, AppError> {
    Ok(Json(services.delete_by_file_name(&user, &file_name).await?))
}

// ============ Reconciliation ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReconcileResponse {
    #[serde(flatten)]
    outcome: ReconcileOutcome,
    needs_refresh: bool,
}

async fn handle_reconcile(
    State(services): State<Arc<Services>>,
    Path(project): Path<String>,
) -> Result<Json<ReconcileResponse>, AppError> {
    let outcome = services.reconcile(&project).await?;
    Ok(Json(ReconcileResponse {
        needs_refresh: outcome.needs_refresh(),
        outcome,
    }))
}
