//! HTTP surface.
//!
//! - `POST /run?task=` runs a task through the dispatcher
//! - `GET /read?path=` returns a sandboxed file
//! - `GET /health` liveness plus whether the LLM fallback is enabled
//! - `GET /operations` the keyword catalog in routing order

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Instrument};

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::DispatchError;
use crate::operations::registry::OperationDescriptor;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

#[derive(Debug, Deserialize)]
struct RunParams {
    task: String,
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    path: String,
}

#[derive(Debug, Serialize)]
struct RunResponse {
    status: &'static str,
    output: String,
}

#[derive(Debug, Serialize)]
struct ReadResponse {
    status: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    fallback: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    detail: String,
}

/// A dispatch failure rendered as an HTTP error.
pub struct ApiError(DispatchError);

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            DispatchError::AccessDenied(_) => StatusCode::FORBIDDEN,
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::Model(_) => StatusCode::BAD_GATEWAY,
            DispatchError::Execution(_)
            | DispatchError::Operation { .. }
            | DispatchError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            status: "error",
            detail: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

async fn run_task(
    State(state): State<AppState>,
    Query(params): Query<RunParams>,
) -> Result<Json<RunResponse>, ApiError> {
    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("run", %request_id);
    let output = state
        .dispatcher
        .try_run(&params.task)
        .instrument(span)
        .await?;
    Ok(Json(RunResponse {
        status: "success",
        output,
    }))
}

async fn read_file(
    State(state): State<AppState>,
    Query(params): Query<ReadParams>,
) -> Result<Json<ReadResponse>, ApiError> {
    let content = state.dispatcher.read(&params.path).await?;
    Ok(Json(ReadResponse {
        status: "success",
        content,
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        fallback: state.dispatcher.synthesizer().is_available(),
    })
}

async fn operations(State(state): State<AppState>) -> Json<Vec<OperationDescriptor>> {
    Json(state.dispatcher.registry().descriptors())
}

pub fn router(dispatcher: Arc<Dispatcher>, cors: bool) -> Router {
    let app = Router::new()
        .route("/run", post(run_task))
        .route("/read", get(read_file))
        .route("/health", get(health))
        .route("/operations", get(operations))
        .with_state(AppState { dispatcher })
        .layer(TraceLayer::new_for_http());

    if cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn serve(config: &ServerConfig, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("HTTP server listening on http://{addr}");

    axum::serve(listener, router(dispatcher, config.cors))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received, draining connections");
    }
}
