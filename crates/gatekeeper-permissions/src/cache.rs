//! Bundle caching with background refresh.
//!
//! [`BundleCache`] keeps the last-known-good [`Bundle`] in memory so request
//! paths never wait on the permissions API. A background task refreshes it
//! on a fixed interval and evicts it once it has been stale for too long.
//!
//! # Lifecycle
//!
//! ```text
//!  empty ──refresh ok──▶ cached ──refresh ok──▶ cached (replaced)
//!    ▲                     │
//!    └──── expiry check ◀──┘ (no successful refresh within max_age)
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use gatekeeper_core::HealthCheck;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bundle::Bundle;
use crate::config::CacheConfig;
use crate::error::{PermissionsError, PermissionsResult};
use crate::store::BundleStore;

/// Health message when a fresh bundle is cached.
pub const HEALTH_MSG_OK: &str = "permissions bundle cached and up to date";

/// Health message when the last refresh failed.
pub const HEALTH_MSG_STALE: &str = "last permissions bundle update failed";

/// Health message when no bundle is cached.
pub const HEALTH_MSG_EMPTY: &str = "permissions bundle not cached";

/// The cached state; replaced field by field under one lock.
#[derive(Debug, Default)]
struct CacheRecord {
    bundle: Option<Arc<Bundle>>,
    /// Time of the last refresh attempt, successful or not.
    last_updated: Option<DateTime<Utc>>,
    last_update_successful: bool,
    /// Time the current bundle was fetched.
    bundle_fetched_at: Option<DateTime<Utc>>,
}

/// Handle on the running background refresher.
#[derive(Debug)]
struct Refresher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Snapshot of the cache state for diagnostics.
#[derive(Debug, Clone)]
pub struct CacheStatus {
    /// Whether a bundle is cached.
    pub cached: bool,
    /// Time of the last refresh attempt.
    pub last_updated: Option<DateTime<Utc>>,
    /// Whether the last refresh attempt succeeded.
    pub last_update_successful: bool,
}

/// In-memory cache of the permissions bundle.
pub struct BundleCache {
    store: Arc<dyn BundleStore>,
    config: CacheConfig,
    record: Mutex<CacheRecord>,
    refresher: Mutex<Option<Refresher>>,
}

impl std::fmt::Debug for BundleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleCache")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl BundleCache {
    /// Create an empty cache over the given store.
    pub fn new(store: Arc<dyn BundleStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            record: Mutex::new(CacheRecord::default()),
            refresher: Mutex::new(None),
        }
    }

    /// The cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the cached bundle.
    ///
    /// Fails with [`PermissionsError::NotCached`] if nothing has been fetched
    /// yet or the bundle was evicted as stale.
    pub fn read(&self) -> PermissionsResult<Arc<Bundle>> {
        self.record
            .lock()
            .bundle
            .clone()
            .ok_or(PermissionsError::NotCached)
    }

    /// Fetch a bundle from the store and swap it in.
    ///
    /// On failure the previous bundle is kept and the failure recorded.
    pub async fn refresh(&self) -> PermissionsResult<Arc<Bundle>> {
        let result = self.store.fetch_bundle().await;
        let now = Utc::now();

        let mut record = self.record.lock();
        record.last_updated = Some(now);

        match result {
            Ok(bundle) => {
                let bundle = Arc::new(bundle);
                record.bundle = Some(Arc::clone(&bundle));
                record.bundle_fetched_at = Some(now);
                record.last_update_successful = true;
                drop(record);

                metrics::counter!("gatekeeper_bundle_refresh_total", "result" => "success")
                    .increment(1);
                debug!(permissions = bundle.len(), "permissions bundle refreshed");
                Ok(bundle)
            }
            Err(err) => {
                record.last_update_successful = false;
                let still_cached = record.bundle.is_some();
                drop(record);

                metrics::counter!("gatekeeper_bundle_refresh_total", "result" => "failure")
                    .increment(1);
                warn!(error = %err, still_cached, "permissions bundle refresh failed");
                Err(err)
            }
        }
    }

    /// Evict the bundle if it was fetched more than `max_age` before `now`.
    ///
    /// Returns `true` if a bundle was evicted.
    pub fn check_expiry(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let mut record = self.record.lock();

        let Some(fetched_at) = record.bundle_fetched_at else {
            return false;
        };
        let age = now.signed_duration_since(fetched_at);
        let expired = age.to_std().is_ok_and(|age| age > max_age);

        if expired && record.bundle.is_some() {
            record.bundle = None;
            drop(record);
            warn!(
                age_secs = age.num_seconds(),
                max_age_secs = max_age.as_secs(),
                "permissions bundle expired, evicting"
            );
            return true;
        }
        false
    }

    /// Tri-state health of the cache.
    pub fn health(&self) -> HealthCheck {
        let record = self.record.lock();
        if record.bundle.is_none() {
            HealthCheck::critical(HEALTH_MSG_EMPTY)
        } else if !record.last_update_successful {
            HealthCheck::warning(HEALTH_MSG_STALE)
        } else {
            HealthCheck::ok(HEALTH_MSG_OK)
        }
    }

    /// Snapshot of the cache state.
    pub fn status(&self) -> CacheStatus {
        let record = self.record.lock();
        CacheStatus {
            cached: record.bundle.is_some(),
            last_updated: record.last_updated,
            last_update_successful: record.last_update_successful,
        }
    }

    /// Check if the background refresher is running.
    pub fn is_refreshing(&self) -> bool {
        self.refresher
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Start the background refresher using the configured intervals.
    pub fn start(self: &Arc<Self>, cancel: &CancellationToken) -> PermissionsResult<()> {
        self.run_periodic_refresh(cancel, self.config.update_interval, self.config.max_age)
    }

    /// Start the background refresher.
    ///
    /// The task refreshes immediately, retries every
    /// [`CacheConfig::startup_retry_interval`] until the first success, then
    /// refreshes every `update_interval`. Expiry is checked after every
    /// refresh and every [`CacheConfig::expiry_check_interval`]. It stops when
    /// `cancel` fires, on [`close`](Self::close), or once the cache is dropped.
    pub fn run_periodic_refresh(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        update_interval: Duration,
        max_age: Duration,
    ) -> PermissionsResult<()> {
        CacheConfig {
            update_interval,
            max_age,
            ..self.config.clone()
        }
        .validate()?;

        let mut refresher = self.refresher.lock();
        if refresher.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(PermissionsError::Config(
                "periodic refresh already running".to_string(),
            ));
        }

        let token = cancel.child_token();
        let intervals = LoopIntervals {
            update: update_interval,
            max_age,
            startup_retry: self.config.startup_retry_interval,
            expiry_check: self.config.expiry_check_interval,
        };
        let handle = tokio::spawn(Self::refresh_loop(
            Arc::downgrade(self),
            token.clone(),
            intervals,
        ));

        *refresher = Some(Refresher {
            cancel: token,
            handle,
        });
        info!(
            update_interval_secs = update_interval.as_secs(),
            max_age_secs = max_age.as_secs(),
            "permissions cache refresher started"
        );
        Ok(())
    }

    /// Stop the background refresher and wait for it to exit.
    ///
    /// Safe to call more than once and when no refresher was started.
    pub async fn close(&self) -> PermissionsResult<()> {
        let refresher = self.refresher.lock().take();
        let Some(refresher) = refresher else {
            return Ok(());
        };

        refresher.cancel.cancel();
        refresher
            .handle
            .await
            .map_err(|e| PermissionsError::Shutdown(e.to_string()))?;

        info!("permissions cache refresher stopped");
        Ok(())
    }

    async fn refresh_loop(cache: Weak<Self>, cancel: CancellationToken, intervals: LoopIntervals) {
        // Retry on the short interval until the first bundle arrives.
        loop {
            match Self::refresh_step(&cache, &cancel, intervals.max_age).await {
                None => return,
                Some(true) => break,
                Some(false) => {}
            }
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(intervals.startup_retry) => {}
            }
        }

        let start = tokio::time::Instant::now();
        let mut refresh_ticker =
            tokio::time::interval_at(start + intervals.update, intervals.update);
        let mut expiry_ticker =
            tokio::time::interval_at(start + intervals.expiry_check, intervals.expiry_check);
        refresh_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        expiry_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = refresh_ticker.tick() => {
                    if Self::refresh_step(&cache, &cancel, intervals.max_age).await.is_none() {
                        break;
                    }
                }
                _ = expiry_ticker.tick() => {
                    let Some(cache) = cache.upgrade() else { break };
                    cache.check_expiry(Utc::now(), intervals.max_age);
                }
            }
        }
        debug!("permissions cache refresh loop exited");
    }

    /// One refresh plus expiry check. `None` means the loop should stop.
    async fn refresh_step(
        cache: &Weak<Self>,
        cancel: &CancellationToken,
        max_age: Duration,
    ) -> Option<bool> {
        let cache = cache.upgrade()?;
        let refreshed = tokio::select! {
            () = cancel.cancelled() => return None,
            result = cache.refresh() => result.is_ok(),
        };
        cache.check_expiry(Utc::now(), max_age);
        Some(refreshed)
    }
}

impl Drop for BundleCache {
    fn drop(&mut self) {
        if let Some(refresher) = self.refresher.get_mut().take() {
            refresher.cancel.cancel();
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LoopIntervals {
    update: Duration,
    max_age: Duration,
    startup_retry: Duration,
    expiry_check: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Policy;
    use gatekeeper_core::{BoxFuture, HealthState};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted results, then repeats the last one.
    struct ScriptedStore {
        results: Mutex<VecDeque<Result<Bundle, u16>>>,
        calls: AtomicUsize,
    }

    impl ScriptedStore {
        fn new(results: Vec<Result<Bundle, u16>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl BundleStore for ScriptedStore {
        fn fetch_bundle(&self) -> BoxFuture<'_, PermissionsResult<Bundle>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock();
            let next = if results.len() > 1 {
                results.pop_front()
            } else {
                results.front().cloned()
            };
            Box::pin(async move {
                match next.unwrap_or(Err(500)) {
                    Ok(bundle) => Ok(bundle),
                    Err(status) => Err(PermissionsError::unexpected_status(status)),
                }
            })
        }
    }

    fn bundle(policy_id: &str) -> Bundle {
        Bundle::new().with_policy("users.add", "group/admin", Policy::unconditional(policy_id))
    }

    fn fast_config() -> CacheConfig {
        CacheConfig::new()
            .with_update_interval(Duration::from_millis(20))
            .with_max_age(Duration::from_secs(60))
            .with_expiry_check_interval(Duration::from_millis(10))
            .with_startup_retry_interval(Duration::from_millis(5))
    }

    #[test]
    fn test_read_empty_cache() {
        let cache = BundleCache::new(ScriptedStore::new(vec![]), CacheConfig::default());
        assert!(cache.read().unwrap_err().is_not_cached());
    }

    #[tokio::test]
    async fn test_refresh_then_read_returns_same_bundle() {
        let store = ScriptedStore::new(vec![Ok(bundle("p1"))]);
        let cache = BundleCache::new(store, CacheConfig::default());

        let refreshed = cache.refresh().await.unwrap();
        let read = cache.read().unwrap();

        assert!(Arc::ptr_eq(&refreshed, &read));
        assert_eq!(*read, bundle("p1"));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_bundle() {
        let store = ScriptedStore::new(vec![Ok(bundle("p1")), Err(503)]);
        let cache = BundleCache::new(store, CacheConfig::default());

        cache.refresh().await.unwrap();
        let err = cache.refresh().await.unwrap_err();

        assert!(matches!(err, PermissionsError::UnexpectedStatus { status: 503 }));
        assert_eq!(*cache.read().unwrap(), bundle("p1"));

        let status = cache.status();
        assert!(status.cached);
        assert!(!status.last_update_successful);
        assert!(status.last_updated.is_some());
    }

    #[test]
    fn test_check_expiry_evicts_old_bundle() {
        let cache = BundleCache::new(
            ScriptedStore::new(vec![Ok(bundle("p1"))]),
            CacheConfig::default(),
        );
        tokio_test::block_on(cache.refresh()).unwrap();

        let max_age = Duration::from_secs(60);
        assert!(!cache.check_expiry(Utc::now(), max_age));
        assert!(cache.read().is_ok());

        let later = Utc::now() + chrono::Duration::seconds(61);
        assert!(cache.check_expiry(later, max_age));
        assert!(cache.read().unwrap_err().is_not_cached());
    }

    #[test]
    fn test_check_expiry_on_empty_cache_is_noop() {
        let cache = BundleCache::new(ScriptedStore::new(vec![]), CacheConfig::default());
        assert!(!cache.check_expiry(Utc::now(), Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_health_states() {
        let store = ScriptedStore::new(vec![Ok(bundle("p1")), Err(500)]);
        let cache = BundleCache::new(store, CacheConfig::default());

        let health = cache.health();
        assert_eq!(health.state, HealthState::Critical);
        assert_eq!(health.message, HEALTH_MSG_EMPTY);

        cache.refresh().await.unwrap();
        assert_eq!(cache.health().state, HealthState::Ok);

        cache.refresh().await.unwrap_err();
        let health = cache.health();
        assert_eq!(health.state, HealthState::Warning);
        assert_eq!(health.message, HEALTH_MSG_STALE);
    }

    #[tokio::test]
    async fn test_periodic_refresh_retries_until_first_success() {
        let store = ScriptedStore::new(vec![Err(500), Err(500), Ok(bundle("p1"))]);
        let cache = Arc::new(BundleCache::new(store.clone(), fast_config()));
        let cancel = CancellationToken::new();

        cache.start(&cancel).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.read().is_ok());
        assert!(store.calls() >= 3);

        cache.close().await.unwrap();
        assert!(!cache.is_refreshing());
    }

    #[tokio::test]
    async fn test_periodic_refresh_evicts_bundle_when_upstream_down() {
        let store = ScriptedStore::new(vec![Ok(bundle("p1")), Err(503)]);
        let config = fast_config().with_max_age(Duration::from_millis(500));
        let cache = Arc::new(BundleCache::new(store.clone(), config));
        let cancel = CancellationToken::new();

        cache.start(&cancel).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cache.read().is_ok());
        assert_eq!(cache.health().state, HealthState::Warning);
        assert!(store.calls() >= 2);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(cache.read().unwrap_err().is_not_cached());
        assert_eq!(cache.health().state, HealthState::Critical);
        assert!(!cache.status().cached);

        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_periodic_refresh_slows_down_after_first_success() {
        let store = ScriptedStore::new(vec![Err(503), Err(503), Ok(bundle("p1"))]);
        let config = fast_config().with_update_interval(Duration::from_millis(250));
        let cache = Arc::new(BundleCache::new(store.clone(), config));
        let cancel = CancellationToken::new();

        cache.start(&cancel).unwrap();

        // Two failures on the startup interval, then the first success.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.calls(), 3);
        assert_eq!(cache.health().state, HealthState::Ok);

        // One further refresh on the update interval.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.calls(), 4);

        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let cache = Arc::new(BundleCache::new(
            ScriptedStore::new(vec![Ok(bundle("p1"))]),
            fast_config(),
        ));
        let cancel = CancellationToken::new();

        cache.start(&cancel).unwrap();
        assert!(matches!(
            cache.start(&cancel),
            Err(PermissionsError::Config(_))
        ));
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let cache = Arc::new(BundleCache::new(
            ScriptedStore::new(vec![Ok(bundle("p1"))]),
            fast_config(),
        ));
        cache.close().await.unwrap();

        cache.start(&CancellationToken::new()).unwrap();
        cache.close().await.unwrap();
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_refresh_after_close() {
        let store = ScriptedStore::new(vec![Ok(bundle("p1"))]);
        let cache = Arc::new(BundleCache::new(store.clone(), fast_config()));

        cache.start(&CancellationToken::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.close().await.unwrap();

        let calls = store.calls();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.calls(), calls);
    }

    #[tokio::test]
    async fn test_external_cancellation_stops_refresher() {
        let cache = Arc::new(BundleCache::new(
            ScriptedStore::new(vec![Ok(bundle("p1"))]),
            fast_config(),
        ));
        let cancel = CancellationToken::new();

        cache.start(&cancel).unwrap();
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!cache.is_refreshing());
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let cache = Arc::new(BundleCache::new(
            ScriptedStore::new(vec![]),
            CacheConfig::default(),
        ));
        let result = cache.run_periodic_refresh(
            &CancellationToken::new(),
            Duration::ZERO,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(PermissionsError::Config(_))));
    }
}
