//! Typed-cache orchestrator
//!
//! Owns all cache registrations, sequences initial hydration along the
//! dependency graph, then drives one independent periodic refresh loop per
//! enabled cache.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stokehold_core::cell::CacheHandle;
use stokehold_core::config::CacheRefreshConfig;
use stokehold_core::status::{EntrySnapshot, StatusSource};

use crate::error::OrchestratorError;
use crate::graph;

/// Binds a named cache and its configuration into the orchestrator
pub struct CacheRegistration {
    config: CacheRefreshConfig,
    handle: Arc<dyn CacheHandle>,
}

impl CacheRegistration {
    pub fn new(config: CacheRefreshConfig, handle: Arc<dyn CacheHandle>) -> Self {
        Self { config, handle }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CacheRefreshConfig {
        &self.config
    }
}

struct Inner {
    registrations: Vec<CacheRegistration>,
    by_name: HashMap<String, usize>,
    started: bool,
    shutdown: Option<CancellationToken>,
    timers: Vec<JoinHandle<()>>,
}

/// Orchestrates hydration and steady-state refresh of all registered caches
pub struct CacheOrchestrator {
    inner: Mutex<Inner>,
}

impl Default for CacheOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheOrchestrator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                registrations: Vec::new(),
                by_name: HashMap::new(),
                started: false,
                shutdown: None,
                timers: Vec::new(),
            }),
        }
    }

    /// Register a cache; must happen before [`start`](Self::start)
    pub fn register(&self, registration: CacheRegistration) -> Result<(), OrchestratorError> {
        let mut inner = self.inner.lock();
        if inner.started {
            return Err(OrchestratorError::AlreadyStarted);
        }
        let name = registration.name().to_string();
        if inner.by_name.contains_key(&name) {
            return Err(OrchestratorError::DuplicateCache(name));
        }

        let index = inner.registrations.len();
        inner.registrations.push(registration);
        inner.by_name.insert(name, index);
        Ok(())
    }

    /// Hydrate all caches in dependency order, then start the periodic
    /// refresh loops
    ///
    /// Hydration runs in layers: a layer contains only caches whose
    /// dependencies have all settled, and the whole layer is awaited before
    /// the next one starts. Within a layer, caches launch in descending
    /// priority order (ties by registration order) and run concurrently.
    /// A dependency cycle or an unknown dependency is returned as a fatal
    /// structural error; nothing hydrates.
    pub async fn start(&self, token: CancellationToken) -> Result<(), OrchestratorError> {
        let plan = {
            let mut inner = self.inner.lock();
            if inner.started {
                return Err(OrchestratorError::AlreadyStarted);
            }

            let nodes: Vec<(String, Vec<String>)> = inner
                .registrations
                .iter()
                .map(|r| (r.name().to_string(), r.config.depends_on.clone()))
                .collect();
            let layers = graph::hydration_layers(&nodes)?;

            inner.started = true;
            inner.shutdown = Some(token.clone());

            layers
                .into_iter()
                .map(|layer| {
                    let mut entries: Vec<(i32, usize)> = layer
                        .iter()
                        .map(|name| {
                            let index = inner.by_name[name];
                            (inner.registrations[index].config.priority, index)
                        })
                        .collect();
                    // Descending priority, ties by registration order
                    entries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
                    entries
                        .into_iter()
                        .map(|(_, index)| {
                            let registration = &inner.registrations[index];
                            (
                                registration.config.clone(),
                                registration.handle.clone(),
                            )
                        })
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>()
        };

        info!(layers = plan.len(), "Starting cache hydration");

        for layer in &plan {
            let mut hydrations = Vec::new();
            for (config, handle) in layer {
                if !config.enabled {
                    info!(cache = %config.name, "Cache disabled, skipping hydration");
                    continue;
                }
                if token.is_cancelled() {
                    info!("Hydration cancelled");
                    return Ok(());
                }

                let handle = handle.clone();
                let name = config.name.clone();
                let token = token.clone();
                hydrations.push(async move {
                    debug!(cache = %name, "Hydrating cache");
                    if !handle.force_refresh(token).await {
                        warn!(cache = %name, "Cache hydration did not produce a value");
                    }
                });
            }
            futures::future::join_all(hydrations).await;
        }

        info!("Cache hydration settled, starting periodic refresh");

        let mut timers = Vec::new();
        for (config, handle) in plan.into_iter().flatten() {
            if !config.enabled {
                continue;
            }
            timers.push(tokio::spawn(refresh_loop(config, handle, token.clone())));
        }

        self.inner.lock().timers = timers;
        Ok(())
    }

    /// Force-refresh a cache by name; unknown names return false
    pub async fn force_refresh(&self, name: &str) -> bool {
        let (handle, token) = {
            let inner = self.inner.lock();
            match inner.by_name.get(name) {
                Some(&index) => (
                    inner.registrations[index].handle.clone(),
                    inner.shutdown.clone().unwrap_or_default(),
                ),
                None => {
                    warn!(cache = %name, "Force refresh requested for unknown cache");
                    return false;
                }
            }
        };

        handle.force_refresh(token).await
    }

    /// Whether a cache with this name is registered
    pub fn has_cache(&self, name: &str) -> bool {
        self.inner.lock().by_name.contains_key(name)
    }

    /// Point-in-time status snapshot of every registered cache
    pub fn cache_statuses(&self) -> HashMap<String, EntrySnapshot> {
        let inner = self.inner.lock();
        inner
            .registrations
            .iter()
            .map(|r| (r.name().to_string(), r.handle.snapshot()))
            .collect()
    }

    /// Cancel the periodic loops; best-effort shutdown
    ///
    /// Loops exit at their next wake point; an in-flight refresh is left to
    /// finish rather than being aborted.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if let Some(token) = inner.shutdown.take() {
            token.cancel();
        }
        inner.timers.clear();
        info!("Cache orchestrator stopped");
    }
}

impl StatusSource for CacheOrchestrator {
    fn statuses(&self) -> anyhow::Result<HashMap<String, EntrySnapshot>> {
        Ok(self.cache_statuses())
    }
}

/// One independent periodic loop per enabled cache
async fn refresh_loop(
    config: CacheRefreshConfig,
    handle: Arc<dyn CacheHandle>,
    token: CancellationToken,
) {
    let initial_delay = config.initial_delay();
    if !initial_delay.is_zero() {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(initial_delay) => {}
        }
    }

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(config.refresh_interval()) => {}
        }

        // Awaited outside the select so cancellation never aborts an
        // in-flight refresh
        handle.refresh(token.clone()).await;
    }

    debug!(cache = %config.name, "Refresh loop stopped");
}
