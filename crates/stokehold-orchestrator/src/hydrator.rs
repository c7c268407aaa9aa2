//! Tiered hydration of generic refresh tasks
//!
//! Tasks are grouped by hydration tier and tiers run strictly ascending:
//! all tier-N work settles before tier-N+1 starts. Within a tier, enabled
//! tasks fan out concurrently; a failing task is logged and does not abort
//! its siblings. Completion is published through a one-shot gate that is
//! safe to await both before and after it fires.

use std::collections::BTreeMap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::tasks::{RefreshTask, TaskRegistry};

/// One-shot hydration-completion gate
///
/// Cloneable; [`wait`](Self::wait) returns immediately once
/// [`TieredHydrator::hydrate`] has finished, no matter whether the waiter
/// arrived before or after the gate fired.
#[derive(Clone)]
pub struct HydrationGate {
    rx: watch::Receiver<bool>,
}

impl HydrationGate {
    /// Suspend until hydration has completed
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|complete| *complete).await.is_err() {
            warn!("Hydration gate dropped before completion");
        }
    }

    pub fn is_complete(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Runs all registered tasks once, tier by tier, then fires the gate
pub struct TieredHydrator {
    tx: watch::Sender<bool>,
    gate: HydrationGate,
}

impl Default for TieredHydrator {
    fn default() -> Self {
        Self::new()
    }
}

impl TieredHydrator {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx,
            gate: HydrationGate { rx },
        }
    }

    /// The completion gate, for the steady-state scheduler and external
    /// readiness checks
    pub fn gate(&self) -> HydrationGate {
        self.gate.clone()
    }

    /// Hydrate every enabled task, ascending by tier
    ///
    /// Disabled tasks are never invoked and never counted against tier
    /// completion. Cancellation stops before the next tier; the gate then
    /// never fires.
    pub async fn hydrate(&self, registry: &TaskRegistry, token: &CancellationToken) {
        let mut tiers: BTreeMap<u32, Vec<&RefreshTask>> = BTreeMap::new();
        for task in registry.iter() {
            tiers.entry(task.config().hydration_tier).or_default().push(task);
        }

        for (tier, tasks) in tiers {
            if token.is_cancelled() {
                info!(tier, "Hydration cancelled before tier");
                return;
            }

            let enabled: Vec<&RefreshTask> = tasks
                .into_iter()
                .filter(|task| {
                    if !task.config().enabled {
                        info!(task = %task.task_id(), tier, "Task disabled, skipping hydration");
                        return false;
                    }
                    true
                })
                .collect();

            info!(tier, tasks = enabled.len(), "Hydrating tier");

            let runs = enabled.into_iter().map(|task| {
                let token = token.clone();
                async move {
                    if let Err(err) = task.invoke(token).await {
                        warn!(task = %task.task_id(), error = %err, "Hydration task failed");
                        metrics::counter!(
                            "stokehold_hydration_failures_total",
                            "task" => task.task_id().to_string()
                        )
                        .increment(1);
                    }
                }
            });
            futures::future::join_all(runs).await;
        }

        info!("Hydration complete");
        let _ = self.tx.send(true);
    }
}
