//! Per-cache refresh state machine
//!
//! A [`RefreshCell`] owns the latest successfully fetched value of one cache
//! and the logic for refreshing it: single-flight concurrency control,
//! retry with exponential backoff, and stale/failed resolution. Fetch errors
//! never escape the cell; they resolve to a status.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{CacheRefreshConfig, FailureMode};
use crate::status::{CacheStatus, EntrySnapshot};

/// The fetch contract: an opaque asynchronous source of cache values
///
/// Implementations know nothing about caching, retry, or scheduling; they
/// produce a value or fail.
#[async_trait]
pub trait CacheSource<T>: Send + Sync {
    async fn fetch(&self, token: CancellationToken) -> anyhow::Result<T>;
}

struct FnSource<F> {
    f: F,
}

#[async_trait]
impl<T, F, Fut> CacheSource<T> for FnSource<F>
where
    T: Send + 'static,
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<T>> + Send,
{
    async fn fetch(&self, token: CancellationToken) -> anyhow::Result<T> {
        (self.f)(token).await
    }
}

/// Wrap an async closure as a [`CacheSource`]
pub fn source_fn<T, F, Fut>(f: F) -> Arc<dyn CacheSource<T>>
where
    T: Send + 'static,
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Arc::new(FnSource { f })
}

struct CellState {
    status: CacheStatus,
    /// Monotonic timestamp of the last successful refresh, for interval math
    last_refresh: Option<Instant>,
    /// Wall-clock timestamp of the last successful refresh, for reporting
    last_refresh_time: Option<DateTime<Utc>>,
}

/// Holds one cached snapshot and refreshes it via an injected source
pub struct RefreshCell<T> {
    config: CacheRefreshConfig,
    source: Arc<dyn CacheSource<T>>,
    snapshot: RwLock<Option<Arc<T>>>,
    state: RwLock<CellState>,
    /// Single-flight gate: at most one refresh attempt in flight per cache
    gate: Semaphore,
}

impl<T: Send + Sync + 'static> RefreshCell<T> {
    pub fn new(config: CacheRefreshConfig, source: Arc<dyn CacheSource<T>>) -> Self {
        Self {
            config,
            source,
            snapshot: RwLock::new(None),
            state: RwLock::new(CellState {
                status: CacheStatus::NotLoaded,
                last_refresh: None,
                last_refresh_time: None,
            }),
            gate: Semaphore::new(1),
        }
    }

    pub fn config(&self) -> &CacheRefreshConfig {
        &self.config
    }

    /// The current value, if one is available
    ///
    /// Never blocks on a fetch and never triggers one.
    pub fn current(&self) -> Option<Arc<T>> {
        self.snapshot.read().clone()
    }

    /// Refresh unconditionally, returning true iff this call performed the
    /// fetch attempt and it succeeded
    ///
    /// Guarded by a capacity-1 gate: a caller that finds a refresh already
    /// in flight returns false immediately rather than queueing.
    pub async fn force_refresh(&self, token: CancellationToken) -> bool {
        let _permit = match self.gate.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(cache = %self.config.name, "Refresh already in flight, skipping");
                return false;
            }
        };

        self.run_attempts(&token).await
    }

    /// Scheduled refresh: short-circuits to false without touching the gate
    /// while the configured interval has not yet elapsed
    pub async fn refresh(&self, token: CancellationToken) -> bool {
        let due = {
            let state = self.state.read();
            match state.last_refresh {
                Some(at) => at.elapsed() >= self.config.refresh_interval(),
                None => true,
            }
        };

        if !due {
            debug!(cache = %self.config.name, "Refresh interval not elapsed, skipping");
            return false;
        }

        self.force_refresh(token).await
    }

    /// Run the fetch with retries while holding the gate
    async fn run_attempts(&self, token: &CancellationToken) -> bool {
        self.state.write().status = CacheStatus::Loading;

        let retry = &self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            match self.source.fetch(token.clone()).await {
                Ok(value) => {
                    self.commit(value);
                    metrics::counter!(
                        "stokehold_cache_refreshes_total",
                        "cache" => self.config.name.clone(),
                        "outcome" => "success"
                    )
                    .increment(1);
                    debug!(cache = %self.config.name, "Refresh succeeded");
                    return true;
                }
                Err(err) => {
                    if attempt >= retry.max_retries || token.is_cancelled() {
                        warn!(
                            cache = %self.config.name,
                            attempts = attempt + 1,
                            error = %err,
                            "Refresh failed, retries exhausted"
                        );
                        self.resolve_failure();
                        metrics::counter!(
                            "stokehold_cache_refreshes_total",
                            "cache" => self.config.name.clone(),
                            "outcome" => "failure"
                        )
                        .increment(1);
                        return false;
                    }

                    let delay = retry.delay_for(attempt);
                    debug!(
                        cache = %self.config.name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Fetch failed, retrying"
                    );

                    tokio::select! {
                        _ = token.cancelled() => {
                            self.resolve_failure();
                            return false;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }

                    attempt += 1;
                }
            }
        }
    }

    /// Atomically install a freshly fetched value
    fn commit(&self, value: T) {
        *self.snapshot.write() = Some(Arc::new(value));

        let mut state = self.state.write();
        state.status = CacheStatus::Ready;
        state.last_refresh = Some(Instant::now());
        state.last_refresh_time = Some(Utc::now());
    }

    /// Resolve an exhausted refresh: stale if prior data may be kept,
    /// failed otherwise
    fn resolve_failure(&self) {
        let keep_prior = self.config.failure_mode == FailureMode::KeepStale
            && self.snapshot.read().is_some();

        if keep_prior {
            self.state.write().status = CacheStatus::Stale;
        } else {
            *self.snapshot.write() = None;
            self.state.write().status = CacheStatus::Failed;
        }
    }
}

/// Object-safe view of a [`RefreshCell`], letting the orchestrator hold
/// caches of heterogeneous value types in one registry
#[async_trait]
pub trait CacheHandle: Send + Sync {
    fn name(&self) -> &str;

    fn status(&self) -> CacheStatus;

    fn is_ready(&self) -> bool;

    fn last_refresh_time(&self) -> Option<DateTime<Utc>>;

    fn snapshot(&self) -> EntrySnapshot;

    async fn force_refresh(&self, token: CancellationToken) -> bool;

    async fn refresh(&self, token: CancellationToken) -> bool;
}

#[async_trait]
impl<T: Send + Sync + 'static> CacheHandle for RefreshCell<T> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn status(&self) -> CacheStatus {
        self.state.read().status
    }

    fn is_ready(&self) -> bool {
        self.state.read().status.is_ready()
    }

    fn last_refresh_time(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_refresh_time
    }

    fn snapshot(&self) -> EntrySnapshot {
        let state = self.state.read();
        EntrySnapshot {
            status: state.status,
            is_ready: state.status.is_ready(),
            last_refresh_time: state.last_refresh_time,
        }
    }

    async fn force_refresh(&self, token: CancellationToken) -> bool {
        RefreshCell::force_refresh(self, token).await
    }

    async fn refresh(&self, token: CancellationToken) -> bool {
        RefreshCell::refresh(self, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn config(name: &str) -> CacheRefreshConfig {
        let mut config = CacheRefreshConfig::new(name, Duration::from_secs(60));
        config.retry = RetryPolicy::none();
        config
    }

    fn counting_source(calls: Arc<AtomicU32>) -> Arc<dyn CacheSource<u32>> {
        source_fn(move |_token| {
            let calls = calls.clone();
            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }
        })
    }

    #[tokio::test]
    async fn starts_not_loaded_and_empty() {
        let cell = RefreshCell::new(config("prices"), counting_source(Arc::default()));

        assert!(cell.current().is_none());
        assert_eq!(cell.status(), CacheStatus::NotLoaded);
        assert!(!cell.is_ready());
        assert!(cell.last_refresh_time().is_none());
    }

    #[tokio::test]
    async fn successful_refresh_installs_the_value() {
        let cell = RefreshCell::new(config("prices"), counting_source(Arc::default()));

        assert!(cell.force_refresh(CancellationToken::new()).await);
        assert_eq!(*cell.current().unwrap(), 1);
        assert_eq!(cell.status(), CacheStatus::Ready);
        assert!(cell.is_ready());
        assert!(cell.last_refresh_time().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_refresh_respects_the_interval() {
        let calls = Arc::new(AtomicU32::new(0));
        let cell = RefreshCell::new(config("prices"), counting_source(calls.clone()));
        let token = CancellationToken::new();

        assert!(cell.refresh(token.clone()).await);
        let first_time = cell.last_refresh_time();

        // Too early: a no-op that leaves the timestamp untouched
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!cell.refresh(token.clone()).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.last_refresh_time(), first_time);

        // Past the interval it runs again
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cell.refresh(token).await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_force_refreshes_are_single_flight() {
        let calls = Arc::new(AtomicU32::new(0));
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());

        let source = {
            let calls = calls.clone();
            let entered = entered.clone();
            let release = release.clone();
            source_fn(move |_token| {
                let calls = calls.clone();
                let entered = entered.clone();
                let release = release.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    entered.notify_one();
                    release.notified().await;
                    Ok(7u32)
                }
            })
        };

        let cell = Arc::new(RefreshCell::new(config("prices"), source));

        let winner = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.force_refresh(CancellationToken::new()).await })
        };

        // Wait until the winner holds the gate, then pile on
        entered.notified().await;
        let mut losers = Vec::new();
        for _ in 0..8 {
            let cell = cell.clone();
            losers.push(tokio::spawn(async move {
                cell.force_refresh(CancellationToken::new()).await
            }));
        }
        for loser in losers {
            assert!(!loser.await.unwrap());
        }

        release.notify_one();
        assert!(winner.await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn keep_stale_serves_the_prior_value() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = {
            let calls = calls.clone();
            source_fn(move |_token| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(42u32)
                    } else {
                        anyhow::bail!("upstream unavailable")
                    }
                }
            })
        };
        let cell = RefreshCell::new(config("prices"), source);
        let token = CancellationToken::new();

        assert!(cell.force_refresh(token.clone()).await);
        assert!(!cell.force_refresh(token).await);

        assert_eq!(*cell.current().unwrap(), 42);
        assert_eq!(cell.status(), CacheStatus::Stale);
        assert!(cell.is_ready());
    }

    #[tokio::test]
    async fn clear_on_failure_discards_the_snapshot() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = {
            let calls = calls.clone();
            source_fn(move |_token| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(42u32)
                    } else {
                        anyhow::bail!("upstream unavailable")
                    }
                }
            })
        };
        let mut config = config("prices");
        config.failure_mode = FailureMode::ClearOnFailure;
        let cell = RefreshCell::new(config, source);
        let token = CancellationToken::new();

        assert!(cell.force_refresh(token.clone()).await);
        assert!(!cell.force_refresh(token).await);

        assert!(cell.current().is_none());
        assert_eq!(cell.status(), CacheStatus::Failed);
        assert!(!cell.is_ready());
    }

    #[tokio::test]
    async fn failure_without_prior_value_is_failed_not_stale() {
        let source: Arc<dyn CacheSource<u32>> =
            source_fn(|_token| async { anyhow::bail!("boom") });
        let cell = RefreshCell::new(config("prices"), source);

        assert!(!cell.force_refresh(CancellationToken::new()).await);
        assert_eq!(cell.status(), CacheStatus::Failed);
        assert!(!cell.is_ready());
        assert!(cell.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_the_fetch_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = {
            let calls = calls.clone();
            source_fn(move |_token| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        anyhow::bail!("transient")
                    }
                    Ok(9u32)
                }
            })
        };

        let mut config = config("prices");
        config.retry = RetryPolicy {
            max_retries: 3,
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: 1_000,
        };
        let cell = RefreshCell::new(config, source);

        assert!(cell.force_refresh(CancellationToken::new()).await);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cell.status(), CacheStatus::Ready);
        assert_eq!(*cell.current().unwrap(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let source: Arc<dyn CacheSource<u32>> = {
            let calls = calls.clone();
            source_fn(move |_token| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { anyhow::bail!("down") }
            })
        };

        let mut config = config("prices");
        config.retry = RetryPolicy {
            max_retries: 10,
            base_delay_ms: 60_000,
            backoff_multiplier: 1.0,
            max_delay_ms: 60_000,
        };
        let cell = Arc::new(RefreshCell::new(config, source));
        let token = CancellationToken::new();

        let refresh = {
            let cell = cell.clone();
            let token = token.clone();
            tokio::spawn(async move { cell.force_refresh(token).await })
        };

        // Let the first attempt fail and the retry sleep begin
        tokio::time::advance(Duration::from_secs(1)).await;
        token.cancel();

        assert!(!refresh.await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.status(), CacheStatus::Failed);
    }
}
