//! Cache status and operator force-refresh routes

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;
use stokehold_core::status::EntrySnapshot;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/v1/caches
async fn cache_statuses(State(state): State<AppState>) -> Json<BTreeMap<String, EntrySnapshot>> {
    Json(state.orchestrator.cache_statuses().into_iter().collect())
}

#[derive(Serialize)]
struct ForceRefreshResponse {
    cache: String,
    refreshed: bool,
}

/// POST /api/v1/caches/{name}/refresh
///
/// The action reports whether this call performed a successful refresh; a
/// failed or skipped attempt is a 200 with `refreshed: false`, not an error.
async fn force_refresh(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ForceRefreshResponse>, ApiError> {
    if !state.orchestrator.has_cache(&name) {
        return Err(ApiError::NotFound(format!("Cache: {name}")));
    }

    info!(cache = %name, "Operator force refresh");
    let refreshed = state.orchestrator.force_refresh(&name).await;

    Ok(Json(ForceRefreshResponse {
        cache: name,
        refreshed,
    }))
}

/// Create cache routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/caches", get(cache_statuses))
        .route("/api/v1/caches/{name}/refresh", post(force_refresh))
}
