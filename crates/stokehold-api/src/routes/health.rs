//! Liveness and readiness endpoints

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router, extract::State};
use serde::Serialize;
use serde_json::json;
use stokehold_health::HealthVerdict;

use crate::state::AppState;

/// Liveness response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness: the process is up
async fn health() -> Json<HealthResponse> {
    metrics::counter!("stokehold_health_probes_total").increment(1);

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness: hydration complete and the aggregate verdict acceptable
///
/// Healthy and degraded both serve traffic (degraded means stale data, not
/// no data); unhealthy gates traffic with a 503.
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if !state.gate.is_complete() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "verdict": HealthVerdict::Unhealthy.as_str(),
                "reason": "hydration in progress",
            })),
        )
            .into_response();
    }

    let report = state.health.check();
    let status = match report.verdict {
        HealthVerdict::Healthy | HealthVerdict::Degraded => StatusCode::OK,
        HealthVerdict::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(report)).into_response()
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/readyz", get(readyz))
}
