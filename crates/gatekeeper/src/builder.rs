//! Assembling authorisation from configuration.

use std::sync::Arc;

use gatekeeper_config::{AuthorisationConfig, GatekeeperConfig};
use gatekeeper_core::HealthCheck;
use gatekeeper_identity::{HttpIdentityClient, JwtVerifier, TokenResolver};
use gatekeeper_middleware::{AttributeExtractor, Authorisation, Handler, Protected};
use gatekeeper_permissions::{BundleCache, Checker, HttpBundleStore, PermissionsResult};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::GatekeeperResult;

/// Authorisation for one service, built from [`GatekeeperConfig`].
///
/// Cheap to clone; clones share the same cache and verifier.
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    authorisation: Authorisation,
}

impl Gatekeeper {
    /// Build authorisation from configuration.
    ///
    /// When `authorisation.enabled` is false this returns a passthrough and
    /// starts nothing. Otherwise it starts the bundle refresher on the
    /// current Tokio runtime; the refresher stops when `cancel` fires or on
    /// [`close`](Self::close).
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime while enabled.
    pub fn from_config(
        config: &GatekeeperConfig,
        cancel: &CancellationToken,
    ) -> GatekeeperResult<Self> {
        config.validate()?;

        let authorisation = if config.authorisation.enabled {
            permission_checking(&config.authorisation, cancel)?
        } else {
            info!("authorisation disabled, requests pass through");
            Authorisation::Passthrough
        };

        Ok(Self { authorisation })
    }

    /// Wrap an already-built [`Authorisation`].
    pub fn from_authorisation(authorisation: Authorisation) -> Self {
        Self { authorisation }
    }

    /// The underlying authorisation.
    pub fn authorisation(&self) -> &Authorisation {
        &self.authorisation
    }

    /// Take the underlying authorisation.
    pub fn into_authorisation(self) -> Authorisation {
        self.authorisation
    }

    /// Whether requests are actually checked.
    pub fn is_enabled(&self) -> bool {
        self.authorisation.is_enabled()
    }

    /// See [`Authorisation::require`].
    pub fn require<H: Handler>(&self, permission: impl Into<String>, handler: H) -> Protected {
        self.authorisation.require(permission, handler)
    }

    /// See [`Authorisation::require_with_attributes`].
    pub fn require_with_attributes<E, H>(
        &self,
        permission: impl Into<String>,
        extractor: E,
        handler: H,
    ) -> Protected
    where
        E: AttributeExtractor,
        H: Handler,
    {
        self.authorisation
            .require_with_attributes(permission, extractor, handler)
    }

    /// Health of the permissions data.
    pub fn health(&self) -> HealthCheck {
        self.authorisation.health()
    }

    /// Stop the bundle refresher and wait for it to exit.
    pub async fn close(&self) -> PermissionsResult<()> {
        self.authorisation.close().await
    }
}

fn permission_checking(
    config: &AuthorisationConfig,
    cancel: &CancellationToken,
) -> GatekeeperResult<Authorisation> {
    let verifier = JwtVerifier::new(&config.public_keys, config.jwt_config())?;
    let identity = HttpIdentityClient::new(&config.identity_api_url, config.request_timeout())?;
    let resolver = TokenResolver::new(Arc::new(verifier), Arc::new(identity));

    let store = HttpBundleStore::new(&config.store_config())?;
    let cache = Arc::new(BundleCache::new(Arc::new(store), config.cache_config()));
    cache.start(cancel)?;

    info!(
        permissions_api_url = %config.permissions_api_url,
        identity_api_url = %config.identity_api_url,
        public_keys = config.public_keys.len(),
        "authorisation enabled"
    );

    Ok(Authorisation::permission_checking(
        resolver,
        Arc::new(Checker::new(cache)),
    ))
}
