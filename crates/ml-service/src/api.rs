//! HTTP API for predictions, insights, health checks and Prometheus metrics

use crate::SERVICE_NAME;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chainsight_core::{
    health::{Backend, ComponentStatus, HealthRegistry},
    observability::{InsightsMetrics, StructuredLogger},
    InsightsError, ShipmentInput, ShipmentPredictor,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<ShipmentPredictor>,
    pub health_registry: HealthRegistry,
    pub metrics: InsightsMetrics,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        predictor: ShipmentPredictor,
        health_registry: HealthRegistry,
        metrics: InsightsMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            predictor: Arc::new(predictor),
            health_registry,
            metrics,
            logger,
        }
    }
}

/// Error response in the `{ "success": false, "error": ... }` envelope
#[derive(Debug)]
pub enum ApiError {
    Insights(InsightsError),
    MalformedBody(String),
    Internal(String),
}

impl From<InsightsError> for ApiError {
    fn from(e: InsightsError) -> Self {
        ApiError::Insights(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedBody(rejection.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Insights(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Insights(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Insights(e) => e.kind(),
            ApiError::MalformedBody(_) => "malformed_body",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = match &self {
            ApiError::Insights(e) => e.to_string(),
            ApiError::MalformedBody(m) | ApiError::Internal(m) => m.clone(),
        };

        if status.is_server_error() {
            error!(kind, error = %message, "Request failed");
        } else {
            warn!(kind, error = %message, "Rejected request");
        }

        (
            status,
            Json(json!({
                "success": false,
                "error": message,
                "kind": kind,
            })),
        )
            .into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

/// Run a scoring call on the blocking pool
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> chainsight_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("scoring task failed: {}", e)))?
        .map_err(ApiError::from)
}

fn parse_shipment(state: &AppState, body: &Value) -> Result<ShipmentInput, ApiError> {
    ShipmentInput::from_value(body).map_err(|e| {
        state.metrics.inc_prediction_errors(e.kind());
        ApiError::from(e)
    })
}

/// Service liveness summary returned by `/health`
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let backend = state.health_registry.backend().await;
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "models_loaded": backend == Some(Backend::Onnx),
        "model_version": state.predictor.model_version(),
        "backend": backend,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Component health - 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.report().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return ApiError::Internal(format!("failed to encode metrics: {}", e)).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn predict_delay(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let input = parse_shipment(&state, &body)?;

    let predictor = state.predictor.clone();
    let prediction = run_blocking(move || predictor.predict_delay(&input)).await?;

    Ok(Json(json!({ "success": true, "prediction": prediction })))
}

async fn predict_anomaly(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let input = parse_shipment(&state, &body)?;

    let predictor = state.predictor.clone();
    let prediction = run_blocking(move || predictor.predict_anomaly(&input)).await?;

    Ok(Json(json!({ "success": true, "prediction": prediction })))
}

/// Full composite prediction for one shipment
async fn predict(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let input = parse_shipment(&state, &body)?;

    let predictor = state.predictor.clone();
    let result = run_blocking(move || predictor.score_single(&input)).await?;

    state.logger.log_prediction(
        &result.shipment_id,
        result.delay_probability,
        result.anomaly_probability,
        result.risk_score,
        result.risk_level.as_str(),
        state.predictor.model_version(),
    );

    Ok(Json(json!({ "success": true, "prediction": result })))
}

/// Extract the batch from an insights body
///
/// The body must be an object; a missing or null `shipments` key on it is
/// an empty batch.
fn parse_batch(body: &Value) -> chainsight_core::Result<Vec<ShipmentInput>> {
    let fields = match body {
        Value::Object(fields) => fields,
        Value::Array(_) => {
            return Err(InsightsError::input_validation(
                "body",
                "object with a `shipments` array",
                "array",
            ))
        }
        other => {
            return Err(InsightsError::input_validation(
                "body",
                "object with a `shipments` array",
                other.to_string(),
            ))
        }
    };

    match fields.get("shipments") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(list) => ShipmentInput::list_from_value(list),
    }
}

/// Batch insights over `{ "shipments": [...] }`
async fn insights(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let shipments = parse_batch(&body).map_err(|e| {
        state.metrics.inc_prediction_errors(e.kind());
        ApiError::from(e)
    })?;

    let start = Instant::now();
    let predictor = state.predictor.clone();
    let summary = run_blocking(move || predictor.score_batch(&shipments)).await?;
    state
        .logger
        .log_batch_summary(&summary, start.elapsed().as_millis());

    Ok(Json(json!({ "success": true, "insights": summary })))
}

async fn model_info(State(state): State<Arc<AppState>>) -> ApiResult {
    let backend = state.health_registry.backend().await;
    Ok(Json(json!({
        "success": true,
        "backend": backend,
        "metadata": state.predictor.registry().metadata(),
    })))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "Endpoint not found" })),
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/predict", post(predict))
        .route("/predict/delay", post(predict_delay))
        .route("/predict/anomaly", post(predict_anomaly))
        .route("/insights", post(insights))
        .route("/model/info", get(model_info))
        .fallback(not_found)
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
