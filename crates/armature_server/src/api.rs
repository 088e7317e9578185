//! Worker HTTP routes.
//!
//! ```text
//! GET  {base}/health        no auth
//! GET  {base}/tools         catalog listing
//! POST {base}/tools/invoke  ToolCallRequest -> ToolCallResponse
//! POST {base}/mcp           MCP JSON-RPC
//! ```
//!
//! Everything but `/health` sits behind the worker bearer check, which
//! runs before any catalog lookup.

use std::sync::Arc;

use armature_core::{ToolCallRequest, ToolCallResponse, ToolDefinition};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::{header, StatusCode};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{AuthError, WorkerAuth};
use crate::config::ConfigError;
use crate::mcp::McpHandler;
use crate::worker::{HealthReport, Worker, WorkerError};

/// Errors returned by the HTTP routes
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bearer check failed
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    /// Dispatch failed before the tool ran
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// Body is not a valid request
    #[error("Invalid request body: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Worker(WorkerError::ToolNotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Worker(WorkerError::ShuttingDown(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Worker(WorkerError::Setup(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": {
                "status": status.as_u16(),
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[derive(Clone)]
struct AppState {
    worker: Arc<Worker>,
    mcp: McpHandler,
    auth: Option<Arc<WorkerAuth>>,
}

/// Build the worker router
///
/// # Errors
///
/// Returns [`ConfigError::MissingSecret`] when auth is on and no secret is
/// configured
pub fn router(worker: Arc<Worker>) -> Result<Router, ConfigError> {
    let config = worker.config();
    let auth = if config.disable_auth {
        warn!("Worker auth is disabled; every caller may list and invoke tools");
        None
    } else {
        let secret = config.secret.as_ref().ok_or(ConfigError::MissingSecret)?;
        Some(Arc::new(WorkerAuth::new(secret)))
    };
    let base_path = config.base_path.clone();

    let state = AppState {
        mcp: McpHandler::new(Arc::clone(&worker)),
        worker,
        auth,
    };

    let protected = Router::new()
        .route("/tools", get(list_tools))
        .route("/tools/invoke", post(invoke))
        .route("/mcp", post(mcp))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_worker_auth));

    let routes = Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state);

    let routes = if base_path == "/" {
        routes
    } else {
        Router::new().nest(&base_path, routes)
    };
    Ok(routes.layer(TraceLayer::new_for_http()))
}

async fn require_worker_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(auth) = &state.auth {
        let header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        if let Err(err) = auth.authenticate(header) {
            warn!(path = %request.uri().path(), error = %err, "Rejected worker request");
            return Err(err.into());
        }
    }
    Ok(next.run(request).await)
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.worker.health())
}

async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolDefinition>> {
    Json(state.worker.definitions())
}

async fn invoke(
    State(state): State<AppState>,
    body: Result<Json<ToolCallRequest>, JsonRejection>,
) -> Result<Json<ToolCallResponse>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.worker.call_tool(request).await?))
}

async fn mcp(State(state): State<AppState>, body: String) -> Response {
    match state.mcp.handle_message(&body).await {
        Some(text) => ([(header::CONTENT_TYPE, "application/json")], text).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
