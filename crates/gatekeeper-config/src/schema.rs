//! Configuration schema types.

use std::collections::HashMap;
use std::time::Duration;

use gatekeeper_identity::JwtConfig;
use gatekeeper_permissions::{CacheConfig, StoreConfig};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Authorisation configuration section.
///
/// # Example
///
/// ```toml
/// [authorisation]
/// enabled = true
/// permissions_api_url = "http://localhost:25400"
/// identity_api_url = "http://localhost:8082"
/// update_interval_secs = 60
/// max_cache_time_secs = 300
///
/// [authorisation.public_keys]
/// "3a2f9c1e" = "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA..."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthorisationConfig {
    /// Check permissions. When false every request passes through.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of the permissions API.
    #[serde(default = "default_permissions_api_url")]
    pub permissions_api_url: String,

    /// Base URL of the identity service used for legacy tokens.
    #[serde(default = "default_identity_api_url")]
    pub identity_api_url: String,

    /// Seconds between background bundle refreshes.
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// Seconds a bundle may be served after its last successful fetch.
    #[serde(default = "default_max_cache_time")]
    pub max_cache_time_secs: u64,

    /// Seconds between expiry checks.
    #[serde(default = "default_expiry_check_interval")]
    pub expiry_check_interval_secs: u64,

    /// Seconds between refresh attempts until the first bundle arrives.
    #[serde(default = "default_startup_retry_interval")]
    pub startup_retry_interval_secs: u64,

    /// Delays between bundle fetch attempts, in milliseconds.
    #[serde(default = "default_retry_delays")]
    pub retry_delays_ms: Vec<u64>,

    /// HTTP request timeout for both APIs, in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// JWT signing keys: key id → base64 DER RSA public key.
    #[serde(default)]
    pub public_keys: HashMap<String, String>,

    /// Claim holding the caller's username.
    #[serde(default = "default_username_claim")]
    pub username_claim: String,

    /// Claim holding the caller's groups.
    #[serde(default = "default_groups_claim")]
    pub groups_claim: String,

    /// Required JWT issuer.
    #[serde(default)]
    pub issuer: Option<String>,

    /// Required JWT audience.
    #[serde(default)]
    pub audience: Option<String>,
}

impl Default for AuthorisationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            permissions_api_url: default_permissions_api_url(),
            identity_api_url: default_identity_api_url(),
            update_interval_secs: default_update_interval(),
            max_cache_time_secs: default_max_cache_time(),
            expiry_check_interval_secs: default_expiry_check_interval(),
            startup_retry_interval_secs: default_startup_retry_interval(),
            retry_delays_ms: default_retry_delays(),
            request_timeout_ms: default_request_timeout(),
            public_keys: HashMap::new(),
            username_claim: default_username_claim(),
            groups_claim: default_groups_claim(),
            issuer: None,
            audience: None,
        }
    }
}

impl AuthorisationConfig {
    /// HTTP request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Settings for the permissions API client.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new()
            .with_permissions_api_url(self.permissions_api_url.clone())
            .with_retry_delays(
                self.retry_delays_ms
                    .iter()
                    .copied()
                    .map(Duration::from_millis)
                    .collect(),
            )
            .with_request_timeout(self.request_timeout())
    }

    /// Settings for the bundle cache.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_update_interval(Duration::from_secs(self.update_interval_secs))
            .with_max_age(Duration::from_secs(self.max_cache_time_secs))
            .with_expiry_check_interval(Duration::from_secs(self.expiry_check_interval_secs))
            .with_startup_retry_interval(Duration::from_secs(self.startup_retry_interval_secs))
    }

    /// Settings for JWT verification.
    pub fn jwt_config(&self) -> JwtConfig {
        JwtConfig {
            username_claim: self.username_claim.clone(),
            groups_claim: self.groups_claim.clone(),
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            ..JwtConfig::default()
        }
    }

    /// Check the section is usable. Only checked when enabled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        validate_url("authorisation.permissions_api_url", &self.permissions_api_url)?;
        validate_url("authorisation.identity_api_url", &self.identity_api_url)?;

        for (field, value) in [
            ("authorisation.update_interval_secs", self.update_interval_secs),
            ("authorisation.max_cache_time_secs", self.max_cache_time_secs),
            ("authorisation.expiry_check_interval_secs", self.expiry_check_interval_secs),
            ("authorisation.startup_retry_interval_secs", self.startup_retry_interval_secs),
            ("authorisation.request_timeout_ms", self.request_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid_value(field, "must be greater than zero"));
            }
        }

        if self.max_cache_time_secs <= self.update_interval_secs {
            return Err(ConfigError::invalid_value(
                "authorisation.max_cache_time_secs",
                "must be greater than update_interval_secs",
            ));
        }

        if self.username_claim.is_empty() || self.groups_claim.is_empty() {
            return Err(ConfigError::validation_error("JWT claim names must not be empty"));
        }

        Ok(())
    }
}

fn validate_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::invalid_value(
            field,
            format!("expected an http(s) URL, got '{url}'"),
        ))
    }
}

fn default_true() -> bool {
    true
}

fn default_permissions_api_url() -> String {
    "http://localhost:25400".to_string()
}

fn default_identity_api_url() -> String {
    gatekeeper_identity::legacy::DEFAULT_IDENTITY_URL.to_string()
}

fn default_update_interval() -> u64 {
    60
}

fn default_max_cache_time() -> u64 {
    300
}

fn default_expiry_check_interval() -> u64 {
    10
}

fn default_startup_retry_interval() -> u64 {
    30
}

fn default_retry_delays() -> Vec<u64> {
    vec![200, 400]
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_username_claim() -> String {
    gatekeeper_identity::jwt::DEFAULT_USERNAME_CLAIM.to_string()
}

fn default_groups_claim() -> String {
    gatekeeper_identity::jwt::DEFAULT_GROUPS_CLAIM.to_string()
}
