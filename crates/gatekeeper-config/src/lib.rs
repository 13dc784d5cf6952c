//! Gatekeeper Config - typed, layered configuration
//!
//! Configuration is resolved from, in increasing precedence:
//!
//! 1. Built-in defaults
//! 2. A TOML or JSON file
//! 3. A `.env` file
//! 4. `GATEKEEPER__SECTION__KEY` environment variables
//!
//! ```no_run
//! use gatekeeper_config::ConfigLoader;
//!
//! # fn main() -> Result<(), gatekeeper_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_production()
//!     .with_optional_file("gatekeeper.toml")?
//!     .with_env_prefix("GATEKEEPER")
//!     .load()?;
//!
//! println!("permissions API: {}", config.authorisation.permissions_api_url);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::GatekeeperConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::AuthorisationConfig;
pub use gatekeeper_telemetry::{LogConfig, LogFormat};
