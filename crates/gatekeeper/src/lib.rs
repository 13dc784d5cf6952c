//! # Gatekeeper
//!
//! **Permission-checking authorisation for HTTP services**
//!
//! Gatekeeper answers one question per request: may this caller perform this
//! operation on this resource?
//!
//! - 📦 **Cached permissions bundle** – fetched from the permissions API and refreshed in the background
//! - 🔑 **JWT and legacy tokens** – RSA-signed JWTs verified locally, other tokens resolved by the identity service
//! - 🧩 **Conditional policies** – policies may restrict access by request attributes such as collection
//! - 🚦 **Fail closed** – no cached bundle means no access
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gatekeeper::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("gatekeeper.toml")?
//!         .with_env_prefix("GATEKEEPER")
//!         .load()?;
//!     init_logging(&config.logging)?;
//!
//!     let cancel = CancellationToken::new();
//!     let gatekeeper = Gatekeeper::from_config(&config, &cancel)?;
//!
//!     let add_user = gatekeeper.require("users.add", |request: Request| async move {
//!         // Your handler logic here
//!     });
//!
//!     // ... serve, then on shutdown:
//!     gatekeeper.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Request flow
//!
//! ```text
//! Request → bearer token → JWT verify / identity service → EntityData
//!                                                             ↓
//! Response ← handler ← allowed? ← bundle cache + attributes ←┘
//! ```

#![doc(html_root_url = "https://docs.rs/gatekeeper/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod builder;
mod error;

pub use builder::Gatekeeper;
pub use error::{GatekeeperError, GatekeeperResult};

// Re-export core types
pub use gatekeeper_core as core;

// Re-export permissions cache and checker
pub use gatekeeper_permissions as permissions;

// Re-export token verification
pub use gatekeeper_identity as identity;

// Re-export HTTP middleware
pub use gatekeeper_middleware as middleware;

// Re-export configuration
pub use gatekeeper_config as config;

// Re-export logging setup
pub use gatekeeper_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use gatekeeper::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Gatekeeper, GatekeeperError, GatekeeperResult};

    pub use gatekeeper_core::{EntityData, HealthCheck, HealthState};

    pub use gatekeeper_config::{ConfigError, ConfigLoader, GatekeeperConfig};

    pub use gatekeeper_middleware::{
        AttributeExtractor, Authorisation, CollectionIdExtractor, FnExtractor, Handler, Protected,
        Request, Response,
    };

    pub use gatekeeper_permissions::{Attributes, PermissionsChecker};

    pub use gatekeeper_telemetry::init_logging;

    pub use tokio_util::sync::CancellationToken;
}
