//! Stokehold Core
//!
//! This crate provides the building blocks of the proactive cache subsystem:
//! the per-cache refresh state machine, the configuration value types, and
//! the status model shared with the health and orchestration crates.

pub mod cell;
pub mod config;
pub mod error;
pub mod retry;
pub mod status;

pub use cell::{CacheHandle, CacheSource, RefreshCell, source_fn};
pub use config::{CacheRefreshConfig, FailureMode, RefreshSettings, RefreshTaskConfig};
pub use error::ConfigError;
pub use retry::RetryPolicy;
pub use status::{CacheStatus, EntrySnapshot, StatusSource};
