//! Orchestration error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Cache '{0}' is already registered")]
    DuplicateCache(String),

    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("Cache '{cache}' depends on unknown cache '{dependency}'")]
    UnknownDependency { cache: String, dependency: String },

    #[error("Dependency cycle among caches: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Orchestrator already started")]
    AlreadyStarted,
}
