//! HTTP surface for entering readings and inspecting meters.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracking_client::domain::Datapoint;

use crate::{
    meter::{Meter, MeterError},
    registry::MeterRegistry,
    store::MeterAttributes,
    transform::validate_reading,
};

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("unknown meter: {0}")]
    UnknownMeter(String),
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Internal(String),
}

impl From<MeterError> for ApiError {
    fn from(e: MeterError) -> Self {
        match e {
            MeterError::InvalidReading(_) | MeterError::OutOfOrderReading { .. } => {
                ApiError::Rejected(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownMeter(_) => StatusCode::NOT_FOUND,
            ApiError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ReadingRequest {
    pub value: f64,
    /// Defaults to the time the request is handled.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
pub struct ReadingResponse {
    pub entity_id: String,
    pub points_written: usize,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub entity_id: String,
    pub batches_written: usize,
}

#[derive(Debug, Serialize)]
pub struct MeterView {
    pub entity_id: String,
    pub unique_id: String,
    pub unit: String,
    pub statistic_id: String,
    /// Meter value projected to the time of the request.
    pub current_value: Option<f64>,
    #[serde(flatten)]
    pub attributes: MeterAttributes,
}

pub fn router(registry: Arc<MeterRegistry>) -> Router {
    Router::new()
        .route("/meters", get(list_meters))
        .route("/meters/:entity_id", get(get_meter))
        .route("/meters/:entity_id/readings", post(post_reading))
        .route("/meters/:entity_id/reset", post(reset_meter))
        .with_state(registry)
}

/// Serve the API until ctrl-c.
pub async fn serve(bind_addr: &str, registry: Arc<MeterRegistry>) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid api.bind_addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "tracking API listening");

    axum::serve(listener, router(registry).into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

fn lookup(registry: &MeterRegistry, entity_id: &str) -> Result<Arc<Meter>, ApiError> {
    registry
        .get(entity_id)
        .ok_or_else(|| ApiError::UnknownMeter(entity_id.to_string()))
}

async fn list_meters(State(registry): State<Arc<MeterRegistry>>) -> Json<Vec<String>> {
    Json(registry.entity_ids())
}

async fn get_meter(
    State(registry): State<Arc<MeterRegistry>>,
    Path(entity_id): Path<String>,
) -> Result<Json<MeterView>, ApiError> {
    let meter = lookup(&registry, &entity_id)?;
    let current = meter.extrapolated(OffsetDateTime::now_utc()).await?;
    let identity = meter.identity();

    Ok(Json(MeterView {
        entity_id: identity.entity_id.clone(),
        unique_id: identity.unique_id.clone(),
        unit: identity.unit.clone(),
        statistic_id: meter.statistic_id(),
        current_value: current.map(|p| p.value()),
        attributes: meter.attributes().await,
    }))
}

async fn post_reading(
    State(registry): State<Arc<MeterRegistry>>,
    Path(entity_id): Path<String>,
    Json(request): Json<ReadingRequest>,
) -> Result<Json<ReadingResponse>, ApiError> {
    metrics::counter!("api_reading_requests_total").increment(1);
    let meter = lookup(&registry, &entity_id)?;

    let timestamp = request.timestamp.unwrap_or_else(OffsetDateTime::now_utc);
    let reading = Datapoint::try_new(request.value, timestamp).map_err(MeterError::from)?;
    validate_reading(&reading).map_err(|e| ApiError::Rejected(e.to_string()))?;

    let batch = meter
        .accept_reading(reading.value(), reading.timestamp())
        .await?;
    Ok(Json(ReadingResponse {
        entity_id,
        points_written: batch.len(),
    }))
}

async fn reset_meter(
    State(registry): State<Arc<MeterRegistry>>,
    Path(entity_id): Path<String>,
) -> Result<Json<ResetResponse>, ApiError> {
    let meter = lookup(&registry, &entity_id)?;
    let batches_written = meter.reset().await?;
    Ok(Json(ResetResponse {
        entity_id,
        batches_written,
    }))
}
