//! Health aggregation for the cache subsystem
//!
//! Maps per-entry cache statuses from one or more orchestrators to one
//! overall verdict for liveness/readiness probes. A query failure inside a
//! source is reported as unhealthy rather than propagated to the prober.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use stokehold_core::status::{CacheStatus, EntrySnapshot, StatusSource};

/// Overall verdict for a set of cache entries
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthVerdict {
    /// Every entry is ready
    Healthy,
    /// Some entries are serving stale data
    Degraded,
    /// At least one entry cannot serve, or a status query failed
    Unhealthy,
}

impl HealthVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthVerdict::Healthy => "healthy",
            HealthVerdict::Degraded => "degraded",
            HealthVerdict::Unhealthy => "unhealthy",
        }
    }
}

/// Aggregated health report, serialized as the probe payload
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub verdict: HealthVerdict,
    /// Entries responsible for a degraded or unhealthy verdict
    pub offenders: Vec<String>,
    /// Per-name detail map
    pub entries: BTreeMap<String, EntrySnapshot>,
    /// Cause attached when a status query itself failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregates status maps from one or more orchestrators
#[derive(Clone, Default)]
pub struct HealthAggregator {
    sources: Vec<Arc<dyn StatusSource>>,
}

impl HealthAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: Arc<dyn StatusSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn add_source(&mut self, source: Arc<dyn StatusSource>) {
        self.sources.push(source);
    }

    /// Compute the aggregate verdict
    ///
    /// Any entry failed, not loaded, or still loading at check time makes
    /// the whole report unhealthy; otherwise any stale entry degrades it;
    /// otherwise (including an empty map) the report is healthy.
    pub fn check(&self) -> HealthReport {
        metrics::counter!("stokehold_health_checks_total").increment(1);

        let mut entries = BTreeMap::new();
        for source in &self.sources {
            match source.statuses() {
                Ok(statuses) => entries.extend(statuses),
                Err(err) => {
                    warn!(error = %err, "Status query failed during health check");
                    return HealthReport {
                        verdict: HealthVerdict::Unhealthy,
                        offenders: Vec::new(),
                        entries,
                        error: Some(err.to_string()),
                    };
                }
            }
        }

        let not_ready: Vec<String> = entries
            .iter()
            .filter(|(_, snapshot)| {
                matches!(
                    snapshot.status,
                    CacheStatus::Failed | CacheStatus::NotLoaded | CacheStatus::Loading
                )
            })
            .map(|(name, _)| name.clone())
            .collect();
        if !not_ready.is_empty() {
            return HealthReport {
                verdict: HealthVerdict::Unhealthy,
                offenders: not_ready,
                entries,
                error: None,
            };
        }

        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, snapshot)| snapshot.status == CacheStatus::Stale)
            .map(|(name, _)| name.clone())
            .collect();
        if !stale.is_empty() {
            return HealthReport {
                verdict: HealthVerdict::Degraded,
                offenders: stale,
                entries,
                error: None,
            };
        }

        HealthReport {
            verdict: HealthVerdict::Healthy,
            offenders: Vec::new(),
            entries,
            error: None,
        }
    }
}
