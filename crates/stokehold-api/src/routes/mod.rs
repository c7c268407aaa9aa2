//! Route definitions

pub mod caches;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the full router with the given state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(caches::routes())
        .with_state(state)
}
