//! Configuration for the bundle store and cache.

use std::time::Duration;

use crate::error::{PermissionsError, PermissionsResult};

/// Path of the bundle endpoint on the permissions API.
pub const BUNDLE_PATH: &str = "/v1/permissions-bundle";

/// Configuration for the HTTP bundle store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the permissions API.
    pub permissions_api_url: String,
    /// Delays between attempts; one retry per entry.
    pub retry_delays: Vec<Duration>,
    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            permissions_api_url: "http://localhost:25400".to_string(),
            retry_delays: vec![Duration::from_millis(200), Duration::from_millis(400)],
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the permissions API base URL.
    pub fn with_permissions_api_url(mut self, url: impl Into<String>) -> Self {
        self.permissions_api_url = url.into();
        self
    }

    /// Set the retry schedule.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Full URL of the bundle endpoint.
    pub fn bundle_url(&self) -> String {
        format!(
            "{}{}",
            self.permissions_api_url.trim_end_matches('/'),
            BUNDLE_PATH
        )
    }

    /// Total number of attempts a fetch may make.
    pub fn max_attempts(&self) -> usize {
        self.retry_delays.len() + 1
    }
}

/// Configuration for the bundle cache and its background refresher.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Steady-state interval between refreshes.
    pub update_interval: Duration,
    /// Maximum age of a bundle before it is evicted.
    pub max_age: Duration,
    /// Interval between expiry checks.
    pub expiry_check_interval: Duration,
    /// Retry interval until the first successful refresh.
    pub startup_retry_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(60),
            max_age: Duration::from_secs(300),
            expiry_check_interval: Duration::from_secs(10),
            startup_retry_interval: Duration::from_secs(30),
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the update interval.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Set the maximum bundle age.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the expiry check interval.
    pub fn with_expiry_check_interval(mut self, interval: Duration) -> Self {
        self.expiry_check_interval = interval;
        self
    }

    /// Set the startup retry interval.
    pub fn with_startup_retry_interval(mut self, interval: Duration) -> Self {
        self.startup_retry_interval = interval;
        self
    }

    /// Check that every interval is non-zero.
    pub fn validate(&self) -> PermissionsResult<()> {
        let intervals = [
            ("update_interval", self.update_interval),
            ("max_age", self.max_age),
            ("expiry_check_interval", self.expiry_check_interval),
            ("startup_retry_interval", self.startup_retry_interval),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(PermissionsError::Config(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}
