//! Generic refresh task registry
//!
//! Arbitrary named async units of work, registered once at wiring time under
//! stable string keys. The tiered hydrator and the steady-state scheduler
//! both operate over this registry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use stokehold_core::config::RefreshTaskConfig;

use crate::error::OrchestratorError;

/// One invocation of a refresh task; failures are reported, never thrown
/// past the orchestration layer
#[async_trait]
pub trait TaskRun: Send + Sync {
    async fn run(&self, token: CancellationToken) -> anyhow::Result<()>;
}

struct FnTask<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> TaskRun for FnTask<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn run(&self, token: CancellationToken) -> anyhow::Result<()> {
        (self.f)(token).await
    }
}

/// Wrap an async closure as a [`TaskRun`]
pub fn task_fn<F, Fut>(f: F) -> Arc<dyn TaskRun>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnTask { f })
}

/// A registered refresh task: configuration plus the work itself
#[derive(Clone)]
pub struct RefreshTask {
    config: RefreshTaskConfig,
    run: Arc<dyn TaskRun>,
}

impl RefreshTask {
    pub fn new(config: RefreshTaskConfig, run: Arc<dyn TaskRun>) -> Self {
        Self { config, run }
    }

    pub fn task_id(&self) -> &str {
        &self.config.task_id
    }

    pub fn config(&self) -> &RefreshTaskConfig {
        &self.config
    }

    pub async fn invoke(&self, token: CancellationToken) -> anyhow::Result<()> {
        self.run.run(token).await
    }

    pub(crate) fn runner(&self) -> Arc<dyn TaskRun> {
        self.run.clone()
    }
}

/// Maps stable task ids to refresh tasks; built once at wiring time
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Vec<RefreshTask>,
    by_id: HashMap<String, usize>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under its configured id; duplicate ids are rejected
    pub fn register(
        &mut self,
        config: RefreshTaskConfig,
        run: Arc<dyn TaskRun>,
    ) -> Result<(), OrchestratorError> {
        let task_id = config.task_id.clone();
        if self.by_id.contains_key(&task_id) {
            return Err(OrchestratorError::DuplicateTask(task_id));
        }

        let index = self.tasks.len();
        self.tasks.push(RefreshTask::new(config, run));
        self.by_id.insert(task_id, index);
        Ok(())
    }

    pub fn get(&self, task_id: &str) -> Option<&RefreshTask> {
        self.by_id.get(task_id).map(|&index| &self.tasks[index])
    }

    /// Tasks in registration order
    pub fn iter(&self) -> impl Iterator<Item = &RefreshTask> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
