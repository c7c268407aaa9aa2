//! Stokehold Orchestration
//!
//! This crate drives the proactive cache subsystem: dependency-ordered
//! hydration of typed caches, tier-ordered hydration of generic refresh
//! tasks, and the steady-state scheduler that keeps both refreshed after
//! startup.

pub mod caches;
pub mod error;
mod graph;
pub mod hydrator;
pub mod scheduler;
pub mod tasks;

pub use caches::{CacheOrchestrator, CacheRegistration};
pub use error::OrchestratorError;
pub use hydrator::{HydrationGate, TieredHydrator};
pub use scheduler::SteadyStateScheduler;
pub use tasks::{RefreshTask, TaskRegistry, TaskRun, task_fn};
