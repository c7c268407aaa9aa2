//! Stokehold HTTP surface
//!
//! A mountable axum router exposing the health endpoint contract
//! (liveness and readiness) and the operator force-refresh action. Host
//! applications wire it with their orchestrator and health aggregator.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
