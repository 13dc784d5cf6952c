//! Error types for identity resolution.

use thiserror::Error;

/// Result type for JWT verification.
pub type JwtResult<T> = Result<T, JwtError>;

/// Errors produced while verifying a signed bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum JwtError {
    /// The token could not be decoded.
    #[error("token is malformed: {0}")]
    TokenMalformed(String),

    /// The signature does not match the signing key.
    #[error("token signature is invalid")]
    InvalidSignature,

    /// The token's `exp` claim is in the past.
    #[error("token has expired")]
    TokenExpired,

    /// The token's `nbf` claim is in the future.
    #[error("token is not yet valid")]
    TokenNotYetValid,

    /// Issuer or audience did not match configuration.
    #[error("token claims are invalid: {0}")]
    InvalidClaims(String),

    /// The header declares an algorithm outside the RSA family.
    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The header's key id is missing or not configured.
    #[error("unknown signing key: {0}")]
    UnknownKey(String),

    /// The username claim is missing or empty.
    #[error("token has no user id")]
    NoUserId,

    /// The groups claim is missing.
    #[error("token has no groups")]
    NoGroups,

    /// No signing keys are configured.
    #[error("no public keys loaded")]
    PublicKeysEmpty,

    /// A configured public key could not be parsed.
    #[error("invalid public key {kid}: {message}")]
    InvalidPublicKey {
        /// Key id of the bad key.
        kid: String,
        /// Error message.
        message: String,
    },
}

impl JwtError {
    /// Create an invalid public key error.
    pub fn invalid_public_key(kid: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPublicKey {
            kid: kid.into(),
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::ImmatureSignature => Self::TokenNotYetValid,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidIssuer => Self::InvalidClaims("issuer mismatch".to_string()),
            ErrorKind::InvalidAudience => Self::InvalidClaims("audience mismatch".to_string()),
            ErrorKind::InvalidAlgorithm => Self::UnsupportedAlgorithm(err.to_string()),
            _ => Self::TokenMalformed(err.to_string()),
        }
    }
}

/// Errors from the legacy identity service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IdentityClientError {
    /// The request could not be sent or the response not read.
    #[error("identity service transport error: {0}")]
    Transport(String),

    /// The identity service returned a non-2xx status.
    #[error("identity service returned status {status}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
    },

    /// The response body was not a valid identity response.
    #[error("failed to decode identity response: {0}")]
    Decode(String),

    /// The identity service accepted the token but named nobody.
    #[error("identity service returned an empty identifier")]
    EmptyIdentifier,

    /// The client could not be configured.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for IdentityClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Why a bearer token could not be turned into an identity.
///
/// Each variant maps onto one rejection class at the HTTP layer.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The JWT was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(#[source] JwtError),

    /// The legacy identity service rejected the token.
    #[error("forbidden: {0}")]
    Forbidden(#[source] IdentityClientError),

    /// Identity cannot be established right now.
    #[error("identity resolution unavailable: {0}")]
    ServiceUnavailable(String),
}

impl ResolveError {
    /// Whether the failure is operational rather than the caller's fault.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_))
    }
}
