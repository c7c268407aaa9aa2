//! Application state

use std::sync::Arc;
use stokehold_health::HealthAggregator;
use stokehold_orchestrator::{CacheOrchestrator, HydrationGate};

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CacheOrchestrator>,
    pub health: HealthAggregator,
    pub gate: HydrationGate,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<CacheOrchestrator>,
        health: HealthAggregator,
        gate: HydrationGate,
    ) -> Self {
        Self {
            orchestrator,
            health,
            gate,
        }
    }
}
