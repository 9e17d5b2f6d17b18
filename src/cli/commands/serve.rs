//! HTTP API server.
//!
//! Exposes context management, multi-file upload and question answering.
//! Every response that concerns a context carries its id in the
//! `X-Context-Id` header and in a `session_token` cookie; requests may send
//! it back through either.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::context::ContextId;
use crate::error::DocQaError;
use crate::orchestrator::Orchestrator;
use crate::pipeline::{BatchStatus, UploadedFile};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Header carrying the context id in both directions.
pub const CONTEXT_HEADER: &str = "x-context-id";

/// Cookie carrying the context id for browser clients.
pub const CONTEXT_COOKIE: &str = "session_token";

/// Shared application state.
struct AppState {
    orchestrator: Arc<Orchestrator>,
    cookie_max_age: u64,
}

/// Build the API router around an orchestrator.
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let max_upload_bytes = orchestrator.settings().server.max_upload_bytes;
    let cookie_max_age = orchestrator.settings().contexts.max_idle_secs;
    let state = Arc::new(AppState {
        orchestrator,
        cookie_max_age,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/contexts", post(create_context).get(list_contexts))
        .route("/contexts/{id}", get(get_context).delete(delete_context))
        .route("/contexts/{id}/reset", post(reset_context))
        .route("/upload-qa", post(upload_qa))
        .route("/ask-qa", post(ask_qa))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP API server until Ctrl+C.
pub async fn run_serve(
    host: Option<String>,
    port: Option<u16>,
    settings: Settings,
) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Serve, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'docqa doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let orchestrator = Arc::new(Orchestrator::new(settings)?);
    orchestrator.start_sweeper();

    let app = router(orchestrator.clone());

    Output::header("docqa API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET    /health");
    Output::kv("Create context", "POST   /contexts");
    Output::kv("List contexts", "GET    /contexts");
    Output::kv("Context status", "GET    /contexts/{id}");
    Output::kv("Delete context", "DELETE /contexts/{id}");
    Output::kv("Reset context", "POST   /contexts/{id}/reset");
    Output::kv("Upload", "POST   /upload-qa");
    Output::kv("Ask", "POST   /ask-qa");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    orchestrator.shutdown().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    /// Signed so that zero and negative values get a clear 400.
    #[serde(default)]
    k: Option<i64>,
    #[serde(default)]
    context_id: Option<String>,
}

#[derive(Serialize)]
struct ContextCreatedResponse {
    context_id: ContextId,
}

#[derive(Serialize)]
struct ContextResetResponse {
    context_id: ContextId,
    previous_context_id: String,
}

#[derive(Serialize)]
struct ContextDeletedResponse {
    context_id: String,
    deleted: bool,
}

#[derive(Serialize)]
struct ContextListResponse {
    contexts: Vec<crate::context::ContextSummary>,
    total: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

fn with_context<T: Serialize>(
    state: &AppState,
    status: StatusCode,
    context_id: ContextId,
    body: T,
) -> Response {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        CONTEXT_COOKIE, context_id, state.cookie_max_age
    );
    (
        status,
        [(CONTEXT_HEADER, context_id.to_string())],
        [(header::SET_COOKIE, cookie)],
        Json(body),
    )
        .into_response()
}

/// Context id sent by the client: the header wins over the cookie.
fn request_context_id(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(CONTEXT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string);

    from_header.or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == CONTEXT_COOKIE)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

// === Handlers ===

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "contexts": state.orchestrator.store().len(),
        "embedder": state.orchestrator.embedder().name(),
    }))
}

async fn create_context(State(state): State<Arc<AppState>>) -> Response {
    let context_id = state.orchestrator.create_context();
    with_context(
        &state,
        StatusCode::CREATED,
        context_id,
        ContextCreatedResponse { context_id },
    )
}

async fn list_contexts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let contexts = state.orchestrator.list_contexts();
    Json(ContextListResponse {
        total: contexts.len(),
        contexts,
    })
}

async fn get_context(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.orchestrator.get_context_status(&id) {
        Ok(summary) => with_context(&state, StatusCode::OK, summary.context_id, summary),
        Err(e) => error_response(StatusCode::NOT_FOUND, e.to_string()),
    }
}

async fn delete_context(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let deleted = state.orchestrator.delete_context(&id);
    let status = if deleted {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (
        status,
        Json(ContextDeletedResponse {
            context_id: id,
            deleted,
        }),
    )
        .into_response()
}

async fn reset_context(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let context_id = state.orchestrator.reset_context(Some(id.as_str()));
    with_context(
        &state,
        StatusCode::OK,
        context_id,
        ContextResetResponse {
            context_id,
            previous_context_id: id,
        },
    )
}

/// Multipart upload. File parts are named `files` (or `file`); an optional
/// `context_id` text part takes precedence over the `X-Context-Id` header.
async fn upload_qa(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut context_id = request_context_id(&headers);
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid multipart body: {}", e),
                )
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);

        if name == "context_id" {
            match field.text().await {
                Ok(text) if !text.trim().is_empty() => context_id = Some(text),
                Ok(_) => {}
                Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
            }
            continue;
        }

        if filename.is_none() && name != "files" && name != "file" {
            continue;
        }

        match field.bytes().await {
            Ok(bytes) => files.push(UploadedFile::new(filename.unwrap_or_default(), bytes.to_vec())),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }

    if files.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No files provided");
    }

    let outcome = state
        .orchestrator
        .ingest_batch(context_id.as_deref(), files)
        .await;

    let status = match outcome.status {
        BatchStatus::Success => StatusCode::OK,
        BatchStatus::Mixed => StatusCode::MULTI_STATUS,
        BatchStatus::Failed if outcome.results.iter().all(|r| r.is_validation_failure()) => {
            StatusCode::BAD_REQUEST
        }
        BatchStatus::Failed => StatusCode::MULTI_STATUS,
    };

    with_context(&state, status, outcome.context_id, outcome)
}

async fn ask_qa(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AskRequest>,
) -> Response {
    let k = match req.k {
        Some(k) if k <= 0 => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Parameter 'k' must be greater than 0",
            )
        }
        Some(k) => Some(k as usize),
        None => None,
    };

    let context_id = req
        .context_id
        .filter(|id| !id.trim().is_empty())
        .or_else(|| request_context_id(&headers));

    match state
        .orchestrator
        .query(context_id.as_deref(), &req.question, k)
        .await
    {
        Ok(outcome) => with_context(&state, StatusCode::OK, outcome.context_id, outcome),
        Err(e @ DocQaError::Validation(_)) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
