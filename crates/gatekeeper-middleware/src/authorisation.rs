//! Per-request authorisation.
//!
//! Wrapping a handler with [`Authorisation::require`] puts four steps in front
//! of it:
//!
//! ```text
//! Authorization header → resolve identity → extract attributes → check permission → handler
//! ```
//!
//! Each failure maps to exactly one status. Response bodies are generic and
//! never carry internal error text.
//!
//! | Failure                                   | Status |
//! |-------------------------------------------|--------|
//! | missing header / empty bearer token       | 401    |
//! | invalid or expired JWT                    | 401    |
//! | legacy token rejected                     | 403    |
//! | no signing keys loaded                    | 500    |
//! | attribute extraction failed               | 500    |
//! | permission check failed (e.g. no bundle)  | 500    |
//! | permission denied                         | 403    |

use std::fmt;
use std::sync::Arc;

use gatekeeper_core::{BoxFuture, EntityData, HealthCheck};
use gatekeeper_identity::{JwtError, JwtResult, ResolveError, TokenResolver};
use gatekeeper_permissions::{PermissionsChecker, PermissionsResult};
use http::header::AUTHORIZATION;
use http::StatusCode;
use tracing::{debug, error, instrument, warn};

use crate::attributes::AttributeExtractor;
use crate::types::{Handler, Request, Response, ResponseExt};

/// Health message reported when authorisation is disabled.
pub const HEALTH_MSG_PASSTHROUGH: &str = "authorisation disabled";

const BEARER_PREFIX: &str = "Bearer ";

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No usable credentials.
    Unauthorized,
    /// Credentials accepted but not sufficient.
    Forbidden,
    /// The decision could not be made.
    Internal,
}

impl Rejection {
    /// HTTP status for this rejection.
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::Unauthorized => "Authentication required",
            Self::Forbidden => "Access denied",
            Self::Internal => "Internal server error",
        }
    }

    /// The JSON error response sent to the caller.
    pub fn into_response(self) -> Response {
        Response::json_error(self.status_code(), self.code(), self.message())
    }
}

impl From<&ResolveError> for Rejection {
    fn from(err: &ResolveError) -> Self {
        match err {
            ResolveError::Unauthorized(_) => Self::Unauthorized,
            ResolveError::Forbidden(_) => Self::Forbidden,
            ResolveError::ServiceUnavailable(_) => Self::Internal,
        }
    }
}

/// Token from the `Authorization` header, with any `Bearer ` prefix removed.
pub fn bearer_token(request: &Request) -> Option<&str> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX).unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

/// Resolves callers and checks their permissions.
pub struct PermissionCheckingMiddleware {
    resolver: TokenResolver,
    checker: Arc<dyn PermissionsChecker>,
}

impl fmt::Debug for PermissionCheckingMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionCheckingMiddleware")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl PermissionCheckingMiddleware {
    /// Create the middleware.
    pub fn new(resolver: TokenResolver, checker: Arc<dyn PermissionsChecker>) -> Self {
        Self { resolver, checker }
    }

    /// The token resolver.
    pub fn resolver(&self) -> &TokenResolver {
        &self.resolver
    }

    /// The permissions checker.
    pub fn checker(&self) -> &Arc<dyn PermissionsChecker> {
        &self.checker
    }

    /// Decide whether `request` may proceed.
    ///
    /// On success the caller's [`EntityData`] is stored in the request
    /// extensions.
    #[instrument(
        skip(self, extractor, request),
        fields(method = %request.method(), path = %request.uri().path())
    )]
    pub async fn authorise(
        &self,
        permission: &str,
        extractor: Option<&dyn AttributeExtractor>,
        request: &mut Request,
    ) -> Result<(), Rejection> {
        let Some(token) = bearer_token(request) else {
            warn!("request rejected, no bearer token");
            return Err(Rejection::Unauthorized);
        };

        let entity = match self.resolver.resolve(token).await {
            Ok(entity) => entity,
            Err(err) => {
                let rejection = Rejection::from(&err);
                if rejection == Rejection::Internal {
                    error!(error = %err, "identity resolution failed");
                } else {
                    warn!(
                        error = %err,
                        status = rejection.status_code().as_u16(),
                        "request rejected, identity not accepted"
                    );
                }
                return Err(rejection);
            }
        };

        let attributes = match extractor {
            Some(extractor) => match extractor.extract(request) {
                Ok(attributes) => Some(attributes),
                Err(err) => {
                    error!(error = %err, "failed to extract request attributes");
                    return Err(Rejection::Internal);
                }
            },
            None => None,
        };

        match self
            .checker
            .has_permission(&entity, permission, attributes.as_ref())
        {
            Ok(true) => {
                debug!(caller = %entity.log_id(), "request authorised");
                request.extensions_mut().insert(entity);
                Ok(())
            }
            Ok(false) => {
                warn!(caller = %entity.log_id(), "request rejected, permission denied");
                Err(Rejection::Forbidden)
            }
            Err(err) => {
                error!(error = %err, "permission check failed");
                Err(Rejection::Internal)
            }
        }
    }
}

/// Authorisation for a service, enabled or not.
///
/// Chosen once at startup. `Passthrough` wraps handlers without checking
/// anything.
#[derive(Debug, Clone)]
pub enum Authorisation {
    /// Every wrapped request is authorised.
    PermissionChecking(Arc<PermissionCheckingMiddleware>),
    /// Authorisation is disabled.
    Passthrough,
}

impl Authorisation {
    /// Create permission-checking authorisation.
    pub fn permission_checking(
        resolver: TokenResolver,
        checker: Arc<dyn PermissionsChecker>,
    ) -> Self {
        Self::PermissionChecking(Arc::new(PermissionCheckingMiddleware::new(resolver, checker)))
    }

    /// Whether requests are actually checked.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::PermissionChecking(_))
    }

    /// Wrap `handler` so it only runs for callers holding `permission`.
    pub fn require<H: Handler>(&self, permission: impl Into<String>, handler: H) -> Protected {
        Protected {
            authorisation: self.clone(),
            permission: permission.into(),
            extractor: None,
            handler: Arc::new(handler),
        }
    }

    /// Like [`require`](Self::require), evaluating conditions against
    /// attributes taken from each request by `extractor`.
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
        Protected {
            authorisation: self.clone(),
            permission: permission.into(),
            extractor: Some(Arc::new(extractor)),
            handler: Arc::new(handler),
        }
    }

    /// Verify a JWT and return the identity it carries.
    ///
    /// With authorisation disabled no keys are loaded and this always fails
    /// with [`JwtError::PublicKeysEmpty`].
    pub fn parse(&self, token: &str) -> JwtResult<EntityData> {
        match self {
            Self::PermissionChecking(middleware) => middleware.resolver.verifier().parse(token),
            Self::Passthrough => Err(JwtError::PublicKeysEmpty),
        }
    }

    /// Health of the permissions data.
    pub fn health(&self) -> HealthCheck {
        match self {
            Self::PermissionChecking(middleware) => middleware.checker.health(),
            Self::Passthrough => HealthCheck::ok(HEALTH_MSG_PASSTHROUGH),
        }
    }

    /// Stop background work. Safe to call more than once.
    pub async fn close(&self) -> PermissionsResult<()> {
        match self {
            Self::PermissionChecking(middleware) => middleware.checker.close().await,
            Self::Passthrough => Ok(()),
        }
    }
}

/// A handler wrapped by [`Authorisation`].
pub struct Protected {
    authorisation: Authorisation,
    permission: String,
    extractor: Option<Arc<dyn AttributeExtractor>>,
    handler: Arc<dyn Handler>,
}

impl fmt::Debug for Protected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protected")
            .field("permission", &self.permission)
            .field("enabled", &self.authorisation.is_enabled())
            .field("with_attributes", &self.extractor.is_some())
            .finish_non_exhaustive()
    }
}

impl Protected {
    /// The permission this handler requires.
    pub fn permission(&self) -> &str {
        &self.permission
    }
}

impl Handler for Protected {
    fn call(&self, mut request: Request) -> BoxFuture<'_, Response> {
        Box::pin(async move {
            if let Authorisation::PermissionChecking(middleware) = &self.authorisation {
                if let Err(rejection) = middleware
                    .authorise(&self.permission, self.extractor.as_deref(), &mut request)
                    .await
                {
                    return rejection.into_response();
                }
            }
            self.handler.call(request).await
        })
    }
}
