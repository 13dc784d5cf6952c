//! Errors raised while assembling Gatekeeper.

use gatekeeper_config::ConfigError;
use gatekeeper_identity::{IdentityClientError, JwtError};
use gatekeeper_permissions::PermissionsError;
use thiserror::Error;

/// Result type for Gatekeeper construction.
pub type GatekeeperResult<T> = Result<T, GatekeeperError>;

/// A component could not be built from configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatekeeperError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The permissions store or cache could not be created.
    #[error(transparent)]
    Permissions(#[from] PermissionsError),

    /// A configured JWT public key is unusable.
    #[error(transparent)]
    Jwt(#[from] JwtError),

    /// The identity service client could not be created.
    #[error(transparent)]
    Identity(#[from] IdentityClientError),
}
