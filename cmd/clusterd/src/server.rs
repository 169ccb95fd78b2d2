//! HTTP API over the model registry.
//!
//! API endpoints:
//! - GET  /health       - liveness and whether a model is loaded
//! - GET  /model_info   - ModelMetadata of the active model
//! - POST /load_model   - {model_path, method} -> {status, metadata}
//! - POST /save_model   - {model_path} -> {status, metadata}
//! - POST /predict      - {data: [{features}]} -> {predictions}
//! - POST /partial_fit  - {data: [{features}]} -> {status, metadata}
//!
//! Errors are returned as `{"error": {"kind", "message"}}`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clusterd_cluster::{ClusterError, Method, ModelMetadata, ModelRegistry};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoadModelRequest {
    pub model_path: PathBuf,
    pub method: Method,
}

#[derive(Debug, Deserialize)]
pub struct SaveModelRequest {
    pub model_path: PathBuf,
}

/// Body of `/predict` and `/partial_fit`.
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub data: Vec<FeatureRow>,
}

#[derive(Debug, Deserialize)]
pub struct FeatureRow {
    pub features: Vec<f64>,
}

impl BatchRequest {
    fn into_batch(self) -> Vec<Vec<f64>> {
        self.data.into_iter().map(|row| row.features).collect()
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub metadata: ModelMetadata,
}

impl StatusResponse {
    fn ok(metadata: ModelMetadata) -> Self {
        Self {
            status: "ok",
            metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Prediction {
    pub cluster_id: usize,
    pub distance: f64,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub loaded: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
}

/// Handler error, rendered as a JSON error body.
#[derive(Debug)]
pub enum ApiError {
    Cluster(ClusterError),
    InvalidRequest(String),
    Internal(String),
}

impl From<ClusterError> for ApiError {
    fn from(e: ClusterError) -> Self {
        ApiError::Cluster(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::InvalidRequest(e.body_text())
    }
}

fn cluster_status(e: &ClusterError) -> StatusCode {
    match e {
        ClusterError::NotLoaded => StatusCode::CONFLICT,
        ClusterError::MethodMismatch { .. }
        | ClusterError::DimensionMismatch { .. }
        | ClusterError::NonFiniteValue { .. }
        | ClusterError::InsufficientData { .. }
        | ClusterError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        ClusterError::NotFound(_) => StatusCode::NOT_FOUND,
        ClusterError::CorruptModel(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ClusterError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Cluster(e) => (cluster_status(&e), e.kind(), e.to_string()),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "InvalidRequest", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg),
        };
        if status.is_server_error() {
            error!(kind, %message, "request failed");
        } else {
            debug!(kind, %message, "request rejected");
        }
        let body = ErrorBody {
            error: ErrorDetail { kind, message },
        };
        (status, Json(body)).into_response()
    }
}

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/model_info", get(model_info))
        .route("/load_model", post(load_model))
        .route("/save_model", post(save_model))
        .route("/predict", post(predict))
        .route("/partial_fit", post(partial_fit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the API until Ctrl+C, then optionally persists the active model.
pub async fn serve(cfg: &ServerConfig, registry: Arc<ModelRegistry>) -> Result<()> {
    let addr = cfg.listen_addr()?;
    let app = router(AppState::new(Arc::clone(&registry)));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(path) = &cfg.persist_on_shutdown {
        match registry.save_model(path) {
            Ok(meta) => info!(path = %path.display(), method = %meta.method, "active model persisted"),
            Err(ClusterError::NotLoaded) => info!("no active model to persist"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

/// Runs a registry call on the blocking pool; model locks may be contended.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ClusterError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let registry = Arc::clone(&state.registry);
    let loaded = blocking(move || Ok(registry.is_loaded())).await?;
    Ok(Json(HealthResponse {
        status: "ok",
        loaded,
    }))
}

async fn model_info(State(state): State<AppState>) -> Result<Json<ModelMetadata>, ApiError> {
    let registry = Arc::clone(&state.registry);
    let meta = blocking(move || registry.model_info()).await?;
    Ok(Json(meta))
}

async fn load_model(
    State(state): State<AppState>,
    body: Result<Json<LoadModelRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(req) = body?;
    let registry = Arc::clone(&state.registry);
    let meta = blocking(move || registry.load_model(&req.model_path, req.method)).await?;
    Ok(Json(StatusResponse::ok(meta)))
}

async fn save_model(
    State(state): State<AppState>,
    body: Result<Json<SaveModelRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(req) = body?;
    let registry = Arc::clone(&state.registry);
    let meta = blocking(move || registry.save_model(&req.model_path)).await?;
    Ok(Json(StatusResponse::ok(meta)))
}

async fn predict(
    State(state): State<AppState>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(req) = body?;
    let batch = req.into_batch();
    let registry = Arc::clone(&state.registry);
    let assignments = blocking(move || registry.predict(&batch)).await?;
    debug!(n = assignments.len(), "predict");
    Ok(Json(PredictResponse {
        predictions: assignments
            .into_iter()
            .map(|a| Prediction {
                cluster_id: a.cluster_id,
                distance: a.distance,
            })
            .collect(),
    }))
}

async fn partial_fit(
    State(state): State<AppState>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(req) = body?;
    let batch = req.into_batch();
    let n = batch.len();
    let registry = Arc::clone(&state.registry);
    let meta = blocking(move || registry.partial_fit(&batch)).await?;
    debug!(n, total = ?meta.total_samples, "partial_fit");
    Ok(Json(StatusResponse::ok(meta)))
}
