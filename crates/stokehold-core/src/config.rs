//! Refresh configuration value types and the typed settings loader
//!
//! Configuration is loaded once at process start and is immutable after
//! that. Missing required fields (such as `refresh_interval_secs`) fail the
//! load; the `enabled` flag fails open so a typo never silently disables a
//! cache or task.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Error type for parsing a failure mode
#[derive(Debug, Clone)]
pub struct ParseFailureModeError(String);

impl fmt::Display for ParseFailureModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid failure mode: {}", self.0)
    }
}

impl std::error::Error for ParseFailureModeError {}

/// What happens to an existing snapshot when a refresh exhausts its retries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Keep serving the prior value and mark the cache stale
    #[default]
    KeepStale,
    /// Discard any prior value and mark the cache failed
    ClearOnFailure,
}

impl FailureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureMode::KeepStale => "keep_stale",
            FailureMode::ClearOnFailure => "clear_on_failure",
        }
    }
}

impl FromStr for FailureMode {
    type Err = ParseFailureModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep_stale" => Ok(FailureMode::KeepStale),
            "clear_on_failure" => Ok(FailureMode::ClearOnFailure),
            _ => Err(ParseFailureModeError(s.to_string())),
        }
    }
}

/// Per-cache refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRefreshConfig {
    /// Unique cache name within the registry
    pub name: String,
    /// Steady-state refresh cadence in seconds (required)
    pub refresh_interval_secs: u64,
    /// Delay before the first periodic tick after hydration
    #[serde(default)]
    pub initial_delay_secs: u64,
    /// Whether this cache participates in hydration and periodic refresh.
    /// Missing or unparseable values default to true.
    #[serde(default = "default_enabled", deserialize_with = "enabled_fail_open")]
    pub enabled: bool,
    /// Higher priority hydrates earlier among caches with no dependency
    /// relation between them
    #[serde(default)]
    pub priority: i32,
    /// Names of caches that must settle before this one hydrates
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Retry behavior inside a single refresh attempt
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Resolution when retries are exhausted
    #[serde(default)]
    pub failure_mode: FailureMode,
}

impl CacheRefreshConfig {
    /// A minimal enabled configuration, used by tests and programmatic wiring
    pub fn new(name: impl Into<String>, refresh_interval: Duration) -> Self {
        Self {
            name: name.into(),
            refresh_interval_secs: refresh_interval.as_secs(),
            initial_delay_secs: 0,
            enabled: true,
            priority: 0,
            depends_on: Vec::new(),
            retry: RetryPolicy::default(),
            failure_mode: FailureMode::default(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

/// Per-task refresh configuration for the generic task path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTaskConfig {
    /// Unique task id within the registry
    pub task_id: String,
    /// Steady-state refresh cadence in seconds (required)
    pub refresh_interval_secs: u64,
    /// Delay before the first steady-state invocation
    #[serde(default)]
    pub initial_delay_secs: u64,
    /// Missing or unparseable values default to true
    #[serde(default = "default_enabled", deserialize_with = "enabled_fail_open")]
    pub enabled: bool,
    /// Hydration tier; tiers run strictly ascending
    #[serde(default)]
    pub hydration_tier: u32,
}

impl RefreshTaskConfig {
    pub fn new(task_id: impl Into<String>, refresh_interval: Duration) -> Self {
        Self {
            task_id: task_id.into(),
            refresh_interval_secs: refresh_interval.as_secs(),
            initial_delay_secs: 0,
            enabled: true,
            hydration_tier: 0,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

/// The `[refresh]` section of process configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshSettings {
    #[serde(default)]
    pub caches: Vec<CacheRefreshConfig>,
    #[serde(default)]
    pub tasks: Vec<RefreshTaskConfig>,
}

impl RefreshSettings {
    /// Load settings from a TOML file
    ///
    /// A missing file, unparseable content, or a missing required field is a
    /// hard startup error; the process must refuse to run with an
    /// ill-defined schedule.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read refresh settings: {}", path.display()))?;

        let settings: RefreshSettings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse refresh settings: {}", path.display()))?;

        settings.validate()?;

        info!(
            "Loaded refresh settings from {} ({} caches, {} tasks)",
            path.display(),
            settings.caches.len(),
            settings.tasks.len()
        );
        Ok(settings)
    }

    /// Structural validation: unique names/ids, no self-dependencies,
    /// non-zero intervals
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for cache in &self.caches {
            if !names.insert(cache.name.as_str()) {
                return Err(ConfigError::DuplicateCache(cache.name.clone()));
            }
            if cache.depends_on.iter().any(|d| d == &cache.name) {
                return Err(ConfigError::SelfDependency(cache.name.clone()));
            }
            if cache.refresh_interval_secs == 0 {
                return Err(ConfigError::InvalidInterval {
                    name: cache.name.clone(),
                    reason: "refresh_interval_secs must be greater than zero".to_string(),
                });
            }
        }

        let mut ids = HashSet::new();
        for task in &self.tasks {
            if !ids.insert(task.task_id.as_str()) {
                return Err(ConfigError::DuplicateTask(task.task_id.clone()));
            }
            if task.refresh_interval_secs == 0 {
                return Err(ConfigError::InvalidInterval {
                    name: task.task_id.clone(),
                    reason: "refresh_interval_secs must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get a cache configuration by name
    pub fn cache(&self, name: &str) -> Option<&CacheRefreshConfig> {
        self.caches.iter().find(|c| c.name == name)
    }

    /// Get a task configuration by id
    pub fn task(&self, task_id: &str) -> Option<&RefreshTaskConfig> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }
}

fn default_enabled() -> bool {
    true
}

/// Fail-open deserializer for the `enabled` flag: a value that cannot be
/// read as a bool defaults to true, so a typo never silently disables a
/// cache or task.
fn enabled_fail_open<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Raw::deserialize(deserializer) {
        Ok(Raw::Bool(value)) => value,
        Ok(Raw::Text(text)) => match text.trim().to_lowercase().parse::<bool>() {
            Ok(value) => value,
            Err(_) => {
                warn!(value = %text, "Unparseable enabled flag, defaulting to enabled");
                true
            }
        },
        Ok(Raw::Other(_)) | Err(_) => {
            warn!("Unparseable enabled flag, defaulting to enabled");
            true
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_enabled_defaults_to_true() {
        let cache: CacheRefreshConfig = toml::from_str(
            r#"
            name = "prices"
            refresh_interval_secs = 60
            "#,
        )
        .unwrap();

        assert!(cache.enabled);
        assert_eq!(cache.priority, 0);
        assert!(cache.depends_on.is_empty());
        assert_eq!(cache.failure_mode, FailureMode::KeepStale);
    }

    #[test]
    fn unparseable_enabled_fails_open() {
        let cache: CacheRefreshConfig = toml::from_str(
            r#"
            name = "prices"
            refresh_interval_secs = 60
            enabled = "definitely"
            "#,
        )
        .unwrap();
        assert!(cache.enabled);

        let task: RefreshTaskConfig = toml::from_str(
            r#"
            task_id = "sync"
            refresh_interval_secs = 30
            enabled = 17
            "#,
        )
        .unwrap();
        assert!(task.enabled);
    }

    #[test]
    fn enabled_still_honors_explicit_values() {
        let cache: CacheRefreshConfig = toml::from_str(
            r#"
            name = "prices"
            refresh_interval_secs = 60
            enabled = false
            "#,
        )
        .unwrap();
        assert!(!cache.enabled);

        let cache: CacheRefreshConfig = toml::from_str(
            r#"
            name = "prices"
            refresh_interval_secs = 60
            enabled = "false"
            "#,
        )
        .unwrap();
        assert!(!cache.enabled);
    }

    #[test]
    fn missing_refresh_interval_is_an_error() {
        let result: Result<CacheRefreshConfig, _> = toml::from_str(
            r#"
            name = "prices"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_cache_name_fails_validation() {
        let settings = RefreshSettings {
            caches: vec![
                CacheRefreshConfig::new("prices", Duration::from_secs(60)),
                CacheRefreshConfig::new("prices", Duration::from_secs(120)),
            ],
            tasks: vec![],
        };

        assert!(matches!(
            settings.validate(),
            Err(ConfigError::DuplicateCache(name)) if name == "prices"
        ));
    }

    #[test]
    fn self_dependency_fails_validation() {
        let mut cache = CacheRefreshConfig::new("prices", Duration::from_secs(60));
        cache.depends_on = vec!["prices".to_string()];
        let settings = RefreshSettings {
            caches: vec![cache],
            tasks: vec![],
        };

        assert!(matches!(
            settings.validate(),
            Err(ConfigError::SelfDependency(_))
        ));
    }

    #[test]
    fn zero_interval_fails_validation() {
        let settings = RefreshSettings {
            caches: vec![CacheRefreshConfig::new("prices", Duration::ZERO)],
            tasks: vec![],
        };

        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidInterval { name, .. }) if name == "prices"
        ));
    }

    #[test]
    fn load_parses_a_full_settings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [[caches]]
            name = "rates"
            refresh_interval_secs = 300
            priority = 10

            [[caches]]
            name = "prices"
            refresh_interval_secs = 60
            depends_on = ["rates"]
            failure_mode = "clear_on_failure"

            [caches.retry]
            max_retries = 5
            base_delay_ms = 100

            [[tasks]]
            task_id = "warm-report"
            refresh_interval_secs = 900
            hydration_tier = 2
            "#
        )
        .unwrap();

        let settings = RefreshSettings::load(file.path()).unwrap();
        assert_eq!(settings.caches.len(), 2);
        assert_eq!(settings.tasks.len(), 1);

        let prices = settings.cache("prices").unwrap();
        assert_eq!(prices.depends_on, vec!["rates".to_string()]);
        assert_eq!(prices.failure_mode, FailureMode::ClearOnFailure);
        assert_eq!(prices.retry.max_retries, 5);
        assert_eq!(settings.task("warm-report").unwrap().hydration_tier, 2);
    }

    #[test]
    fn load_fails_on_missing_file() {
        assert!(RefreshSettings::load("/nonexistent/refresh.toml").is_err());
    }
}
