//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, `.env` and environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, GatekeeperConfig};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "GATEKEEPER";

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. `.env` file, loaded into the process environment
/// 4. Environment variables
///
/// # Example
///
/// ```no_run
/// use gatekeeper_config::ConfigLoader;
///
/// # fn main() -> Result<(), gatekeeper_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("gatekeeper.toml")?
///     .with_dotenv()?
///     .with_env_prefix("GATEKEEPER")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: GatekeeperConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GatekeeperConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with development preset configuration.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = GatekeeperConfig::development();
        self
    }

    /// Start with production preset configuration.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = GatekeeperConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension: `.toml` or `.json`. Sections and
    /// fields absent from the file keep their defaults.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `format` ("toml" or "json").
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, e.g.
    /// `GATEKEEPER__AUTHORISATION__PERMISSIONS_API_URL`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load `.env` from the working directory into the environment.
    ///
    /// A missing file is not an error.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::Dotenv(e.to_string())),
        }
    }

    /// Load a specific `.env` file into the environment.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref()).map_err(|e| ConfigError::Dotenv(e.to_string()))?;
        Ok(self)
    }

    /// Apply environment overrides and validate.
    pub fn load(mut self) -> Result<GatekeeperConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Return the configuration without applying overrides or validating.
    #[must_use]
    pub fn load_unvalidated(self) -> GatekeeperConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<GatekeeperConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let env_vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(key_without_prefix) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__"))
        else {
            return Ok(());
        };

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let auth = &mut self.config.authorisation;
        let logging = &mut self.config.logging;

        match parts.as_slice() {
            ["AUTHORISATION", "ENABLED"] => auth.enabled = parse_bool_var(key, value)?,
            ["AUTHORISATION", "PERMISSIONS_API_URL"] => {
                auth.permissions_api_url = value.to_string();
            }
            ["AUTHORISATION", "IDENTITY_API_URL"] => auth.identity_api_url = value.to_string(),
            ["AUTHORISATION", "UPDATE_INTERVAL_SECS"] => {
                auth.update_interval_secs = parse_u64_var(key, value)?;
            }
            ["AUTHORISATION", "MAX_CACHE_TIME_SECS"] => {
                auth.max_cache_time_secs = parse_u64_var(key, value)?;
            }
            ["AUTHORISATION", "EXPIRY_CHECK_INTERVAL_SECS"] => {
                auth.expiry_check_interval_secs = parse_u64_var(key, value)?;
            }
            ["AUTHORISATION", "STARTUP_RETRY_INTERVAL_SECS"] => {
                auth.startup_retry_interval_secs = parse_u64_var(key, value)?;
            }
            ["AUTHORISATION", "REQUEST_TIMEOUT_MS"] => {
                auth.request_timeout_ms = parse_u64_var(key, value)?;
            }
            ["AUTHORISATION", "RETRY_DELAYS_MS"] => {
                auth.retry_delays_ms = split_list(value)
                    .map(|delay| parse_u64_var(key, delay))
                    .collect::<Result<_, _>>()?;
            }
            ["AUTHORISATION", "PUBLIC_KEYS"] => {
                auth.public_keys = parse_public_keys(key, value)?;
            }
            ["AUTHORISATION", "USERNAME_CLAIM"] => auth.username_claim = value.to_string(),
            ["AUTHORISATION", "GROUPS_CLAIM"] => auth.groups_claim = value.to_string(),
            ["AUTHORISATION", "ISSUER"] => auth.issuer = non_empty(value),
            ["AUTHORISATION", "AUDIENCE"] => auth.audience = non_empty(value),

            ["LOGGING", "ENABLED"] => logging.enabled = parse_bool_var(key, value)?,
            ["LOGGING", "LEVEL"] => logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                logging.format = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected 'json' or 'pretty'"))?;
            }
            ["LOGGING", "SPAN_EVENTS"] => logging.span_events = parse_bool_var(key, value)?,
            ["LOGGING", "FILE_LINE_INFO"] => logging.file_line_info = parse_bool_var(key, value)?,
            ["LOGGING", "INCLUDE_TARGET"] => logging.include_target = parse_bool_var(key, value)?,

            // Unknown key - ignore
            _ => {}
        }

        Ok(())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_bool_var(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn parse_u64_var(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// `kid1=base64key,kid2=base64key`. Keys may contain `=` padding, so only the
/// first `=` separates.
fn parse_public_keys(key: &str, value: &str) -> Result<HashMap<String, String>, ConfigError> {
    split_list(value)
        .map(|entry| {
            entry
                .split_once('=')
                .filter(|(kid, public_key)| !kid.is_empty() && !public_key.is_empty())
                .map(|(kid, public_key)| (kid.trim().to_string(), public_key.trim().to_string()))
                .ok_or_else(|| ConfigError::env_parse_error(key, "expected 'kid=key' pairs"))
        })
        .collect()
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
