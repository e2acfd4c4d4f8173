//! HTTP Server
//!
//! Route wiring for the relay. Handlers are thin: they decode the body, hand
//! it to the orchestrator or transcript workflow from `relay-core`, and shape
//! the outcome as JSON, an SSE stream, or an `{"error": ...}` body with the
//! status the error carries.
//!
//! ```text
//!   POST /api/chat      (/chat)       -> CompletionOrchestrator -> {reply} | SSE
//!   POST /api/summarize (/summarize)  -> TranscriptWorkflow     -> {summary}
//!   POST /api/explain   (/explain)    -> TranscriptWorkflow     -> {explanation}
//!   GET  /api/health                  -> backend health checks and models
//!   *                                 -> static client files (index.html fallback)
//! ```

use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use relay_core::{
    ChatEventStream, ChatRequest, ChatResponse, CompletionOrchestrator, LlmBackend, RelayError,
    SummaryMode, TranscriptWorkflow,
};

/// Largest accepted request body; inline images are sent as base64
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

// ============================================================================
// State
// ============================================================================

/// A backend reported by the health route
#[derive(Clone)]
pub struct HealthTarget {
    /// Display name, e.g. `ollama`
    pub name: String,
    /// Client used for the check
    pub backend: Arc<dyn LlmBackend>,
}

/// Shared, immutable state handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// Chat entry point
    pub orchestrator: Arc<CompletionOrchestrator>,
    /// Summary / explanation entry point
    pub workflow: Arc<TranscriptWorkflow>,
    /// Backends probed by `/api/health`
    pub health_targets: Arc<Vec<HealthTarget>>,
}

// ============================================================================
// Errors
// ============================================================================

/// A [`RelayError`] rendered as `{"error": message}` with its status
#[derive(Debug)]
pub struct ApiError(RelayError);

impl From<RelayError> for ApiError {
    fn from(error: RelayError) -> Self {
        Self(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(error = %rejection, "Rejected request body");
        Self(RelayError::BadRequest("Invalid JSON body".to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Build the relay router
///
/// When `static_dir` is given, unmatched paths are served from it and unknown
/// files fall back to its `index.html`.
pub fn build_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/api/chat", post(chat))
        .route("/chat", post(chat))
        .route("/api/summarize", post(summarize))
        .route("/summarize", post(summarize))
        .route("/api/explain", post(explain))
        .route("/explain", post(explain))
        .route("/api/health", get(health))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => router.fallback_service(
            ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
        ),
        None => router,
    };

    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Chat
// ============================================================================

async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body?;

    match state.orchestrator.handle(request).await? {
        ChatResponse::Reply(reply) => Ok(Json(json!({ "reply": reply })).into_response()),
        ChatResponse::Stream(events) => Ok(sse(events).into_response()),
    }
}

/// Frame chat events as `data: {json}` server-sent events
fn sse(
    events: ChatEventStream,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>> + Send> {
    let stream = events.map(|event| {
        Ok(Event::default().json_data(&event).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to encode chat event");
            Event::default().data(r#"{"error":"Failed to communicate with the AI model."}"#)
        }))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ============================================================================
// Transcript Workflows
// ============================================================================

/// Body of `/api/summarize` and `/api/explain`
#[derive(Debug, Default, Deserialize)]
struct VideoRequest {
    #[serde(default)]
    youtube_url: Option<String>,
}

async fn summarize(
    State(state): State<AppState>,
    body: Result<Json<VideoRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    run_workflow(&state, body, SummaryMode::Summary).await
}

async fn explain(
    State(state): State<AppState>,
    body: Result<Json<VideoRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    run_workflow(&state, body, SummaryMode::Explanation).await
}

async fn run_workflow(
    state: &AppState,
    body: Result<Json<VideoRequest>, JsonRejection>,
    mode: SummaryMode,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(request) = body?;
    let text = state
        .workflow
        .run(request.youtube_url.as_deref(), mode)
        .await?;

    let mut body = serde_json::Map::new();
    body.insert(mode.action().to_string(), serde_json::Value::String(text));
    Ok(Json(serde_json::Value::Object(body)))
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
struct BackendHealth {
    name: String,
    healthy: bool,
    /// Models the backend reports; empty when it is down
    models: Vec<String>,
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    backends: Vec<BackendHealth>,
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let checks = state.health_targets.iter().map(|target| async move {
        let healthy = target.backend.health_check().await;
        let models = if healthy {
            match target.backend.list_models().await {
                Ok(models) => models.into_iter().map(|m| m.name).collect(),
                Err(e) => {
                    warn!(backend = %target.name, error = %e, "Failed to list models");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        BackendHealth {
            name: target.name.clone(),
            healthy,
            models,
        }
    });
    let backends = futures::future::join_all(checks).await;

    let status = if backends.iter().any(|b| b.healthy) {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthReport { status, backends })
}
