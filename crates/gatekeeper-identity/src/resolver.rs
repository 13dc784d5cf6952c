//! Bearer token classification and identity resolution.

use std::sync::Arc;

use gatekeeper_core::EntityData;
use tracing::{debug, instrument, warn};

use crate::error::{JwtError, ResolveError};
use crate::jwt::JwtVerifier;
use crate::legacy::IdentityClient;

/// Whether `token` has the three-part `header.payload.signature` shape.
pub fn looks_like_jwt(token: &str) -> bool {
    let mut parts = 0;
    for part in token.split('.') {
        if part.is_empty() {
            return false;
        }
        parts += 1;
    }
    parts == 3
}

/// Turns a raw bearer token into an [`EntityData`].
///
/// Tokens shaped like a JWT are verified locally; anything else is passed to
/// the legacy identity service. Nothing is cached between calls.
#[derive(Clone)]
pub struct TokenResolver {
    verifier: Arc<JwtVerifier>,
    identity: Arc<dyn IdentityClient>,
}

impl std::fmt::Debug for TokenResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResolver")
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

impl TokenResolver {
    /// Create a resolver.
    pub fn new(verifier: Arc<JwtVerifier>, identity: Arc<dyn IdentityClient>) -> Self {
        Self { verifier, identity }
    }

    /// The JWT verifier.
    pub fn verifier(&self) -> &Arc<JwtVerifier> {
        &self.verifier
    }

    /// Resolve the caller behind `token`.
    #[instrument(skip_all, fields(kind))]
    pub async fn resolve(&self, token: &str) -> Result<EntityData, ResolveError> {
        if looks_like_jwt(token) {
            tracing::Span::current().record("kind", "jwt");
            self.resolve_jwt(token)
        } else {
            tracing::Span::current().record("kind", "legacy");
            self.resolve_legacy(token).await
        }
    }

    fn resolve_jwt(&self, token: &str) -> Result<EntityData, ResolveError> {
        match self.verifier.parse(token) {
            Ok(entity) => Ok(entity),
            Err(JwtError::PublicKeysEmpty) => {
                warn!("cannot verify token, no public keys loaded");
                Err(ResolveError::ServiceUnavailable(
                    JwtError::PublicKeysEmpty.to_string(),
                ))
            }
            Err(err) => {
                debug!(error = %err, "token rejected");
                Err(ResolveError::Unauthorized(err))
            }
        }
    }

    async fn resolve_legacy(&self, token: &str) -> Result<EntityData, ResolveError> {
        match self.identity.check_token_identity(token).await {
            Ok(identity) => Ok(EntityData::user(identity.identifier)),
            Err(err) => {
                debug!(error = %err, "legacy token rejected");
                Err(ResolveError::Forbidden(err))
            }
        }
    }
}
