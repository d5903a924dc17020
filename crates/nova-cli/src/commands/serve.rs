//! `novaforge serve` - HTTP interface for callers and workers
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/dispatch` | Submit a content request |
//! | `GET`  | `/poll` | Claim the next queued job (204 when there is none) |
//! | `POST` | `/jobs/{id}/report` | Worker outcome for a claimed job |
//! | `POST` | `/jobs/{id}/requeue` | Re-publish a queued job's entry |
//! | `GET`  | `/jobs/{id}` | Job record |
//! | `GET`  | `/health` | Provider status |

use super::load_dispatcher;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Path as UrlPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use nova_core::{JobId, NovaError};
use nova_forge::{
    DispatchResponse, Dispatcher, ErrorBody, GenerationRequest, PollOutcome, WorkerReport,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub fn run(config: Option<&Path>, bind: Option<String>) -> Result<()> {
    let dispatcher = load_dispatcher(config)?;
    let bind = bind.unwrap_or_else(|| dispatcher.config().server.bind.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(serve(Arc::new(dispatcher), &bind))
}

async fn serve(dispatcher: Arc<Dispatcher>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(addr = %bind, "novaforge listening");

    axum::serve(listener, router(Arc::clone(&dispatcher)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("waiting for in-flight generation tasks");
    tokio::task::spawn_blocking(move || dispatcher.wait_idle())
        .await
        .context("Failed to drain generation tasks")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// Build the router over a shared dispatcher
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/dispatch", post(dispatch))
        .route("/poll", get(poll).post(poll))
        .route("/jobs/{id}", get(job_status))
        .route("/jobs/{id}/report", post(report))
        .route("/jobs/{id}/requeue", post(requeue))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

/// A failed request, rendered as `{"error": ...}`
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<NovaError> for ApiError {
    fn from(err: NovaError) -> Self {
        let status = match &err {
            NovaError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            NovaError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            NovaError::JobNotFound(_) => StatusCode::NOT_FOUND,
            NovaError::InvalidTransition { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Unreadable bodies get the same `{"error": ...}` shape as pipeline errors
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::from(NovaError::InvalidRequest(rejection.body_text()))
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Run a pipeline call off the async workers
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> nova_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("pipeline task failed: {}", e)))?
        .map_err(ApiError::from)
}

fn parse_job_id(raw: &str) -> ApiResult<JobId> {
    raw.parse().map_err(|_| {
        ApiError::from(NovaError::InvalidRequest(format!(
            "invalid job id '{}'",
            raw
        )))
    })
}

async fn dispatch(
    State(dispatcher): State<Arc<Dispatcher>>,
    body: std::result::Result<Json<GenerationRequest>, JsonRejection>,
) -> ApiResult<Json<DispatchResponse>> {
    let Json(request) = body?;
    let receipt = blocking(move || dispatcher.dispatch(&request)).await?;
    Ok(Json(DispatchResponse::from(receipt)))
}

async fn poll(State(dispatcher): State<Arc<Dispatcher>>) -> ApiResult<Response> {
    match blocking(move || dispatcher.claim_next()).await? {
        PollOutcome::Claimed(work) => Ok(Json(work).into_response()),
        PollOutcome::NoWork => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn report(
    State(dispatcher): State<Arc<Dispatcher>>,
    UrlPath(id): UrlPath<String>,
    body: std::result::Result<Json<WorkerReport>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let job_id = parse_job_id(&id)?;
    let Json(report) = body?;
    let outcome = blocking(move || dispatcher.report(&job_id, &report)).await?;
    Ok(Json(json!({ "job_id": job_id, "outcome": outcome })))
}

async fn requeue(
    State(dispatcher): State<Arc<Dispatcher>>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let job_id = parse_job_id(&id)?;
    let key = blocking(move || dispatcher.requeue(&job_id)).await?;
    Ok(Json(json!({ "job_id": job_id, "queue_key": key })))
}

async fn job_status(
    State(dispatcher): State<Arc<Dispatcher>>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<Response> {
    let job_id = parse_job_id(&id)?;
    let job = blocking(move || dispatcher.job(&job_id)).await?;
    Ok(Json(job).into_response())
}

async fn health(State(dispatcher): State<Arc<Dispatcher>>) -> ApiResult<Response> {
    let report = blocking(move || dispatcher.health()).await?;
    Ok(Json(report).into_response())
}
