//! Cache status model shared across crates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status of a single cached entry
///
/// Transitions: NotLoaded -> Loading -> {Ready, Failed};
/// Ready/Stale -> Loading -> {Ready, Stale, Failed}.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// No refresh has completed yet
    #[default]
    NotLoaded,
    /// A refresh attempt is in flight
    Loading,
    /// The last refresh succeeded
    Ready,
    /// The last refresh failed but a prior value is still being served
    Stale,
    /// The last refresh failed and no value is available
    Failed,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::NotLoaded => "not_loaded",
            CacheStatus::Loading => "loading",
            CacheStatus::Ready => "ready",
            CacheStatus::Stale => "stale",
            CacheStatus::Failed => "failed",
        }
    }

    /// A cache is ready while it can serve a value, fresh or stale
    pub fn is_ready(&self) -> bool {
        matches!(self, CacheStatus::Ready | CacheStatus::Stale)
    }
}

/// Point-in-time view of a single cache, as reported to status queries
/// and the health aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub status: CacheStatus,
    pub is_ready: bool,
    pub last_refresh_time: Option<DateTime<Utc>>,
}

/// Provider of per-name status snapshots, consumed by health checks
///
/// The `Result` return models a status query that itself fails; the
/// aggregator reports such a source as unhealthy rather than propagating.
pub trait StatusSource: Send + Sync {
    fn statuses(&self) -> anyhow::Result<HashMap<String, EntrySnapshot>>;
}
