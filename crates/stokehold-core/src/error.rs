//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Duplicate cache name: {0}")]
    DuplicateCache(String),

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Cache '{0}' depends on itself")]
    SelfDependency(String),

    #[error("Invalid refresh interval for '{name}': {reason}")]
    InvalidInterval { name: String, reason: String },
}
