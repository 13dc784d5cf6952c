//! Top-level configuration.

use gatekeeper_telemetry::LogConfig;
use serde::{Deserialize, Serialize};

use crate::{AuthorisationConfig, ConfigError};

/// Complete Gatekeeper configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GatekeeperConfig {
    /// Authorisation settings.
    #[serde(default)]
    pub authorisation: AuthorisationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LogConfig,
}

impl GatekeeperConfig {
    /// Local development: debug logging, human-readable output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            logging: LogConfig::development(),
            ..Self::default()
        }
    }

    /// Production: JSON logging at info level.
    #[must_use]
    pub fn production() -> Self {
        Self {
            logging: LogConfig::production(),
            ..Self::default()
        }
    }

    /// Check every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.authorisation.validate()?;
        self.logging
            .validate()
            .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        Ok(())
    }
}
