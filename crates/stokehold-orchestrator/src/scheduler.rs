//! Steady-state scheduler for generic refresh tasks
//!
//! Waits for hydration to complete, then runs one independent periodic loop
//! per enabled task. Loops never interfere with each other: a slow or
//! failing task cannot delay or break another.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stokehold_core::config::RefreshTaskConfig;

use crate::hydrator::HydrationGate;
use crate::tasks::{TaskRegistry, TaskRun};

/// Spawns the periodic refresh loops once hydration has settled
pub struct SteadyStateScheduler {
    registry: Arc<TaskRegistry>,
    gate: HydrationGate,
}

impl SteadyStateScheduler {
    pub fn new(registry: Arc<TaskRegistry>, gate: HydrationGate) -> Self {
        Self { registry, gate }
    }

    /// Await hydration completion, then start one loop per enabled task
    ///
    /// Disabled tasks get no loop at all; the skip is logged. Returns once
    /// the loops are spawned; they run until the token is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        self.gate.wait().await;

        let mut started = 0usize;
        for task in self.registry.iter() {
            let config = task.config().clone();
            if !config.enabled {
                info!(task = %config.task_id, "Task disabled, no refresh loop started");
                continue;
            }

            tokio::spawn(task_loop(config, task.runner(), token.clone()));
            started += 1;
        }

        info!(loops = started, "Steady-state scheduler running");
    }
}

/// One periodic loop: sleep the initial delay, then invoke and sleep the
/// refresh interval until cancellation
///
/// Invocation failures are logged and the loop continues. Cancellation is
/// only observed at the sleeps, so an in-flight invocation always finishes.
async fn task_loop(config: RefreshTaskConfig, run: Arc<dyn TaskRun>, token: CancellationToken) {
    let task_id = config.task_id.clone();

    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(config.initial_delay()) => {}
    }

    loop {
        if let Err(err) = run.run(token.clone()).await {
            warn!(task = %task_id, error = %err, "Refresh task failed");
            metrics::counter!(
                "stokehold_task_failures_total",
                "task" => task_id.clone()
            )
            .increment(1);
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(config.refresh_interval()) => {}
        }
    }

    debug!(task = %task_id, "Refresh loop stopped");
}
