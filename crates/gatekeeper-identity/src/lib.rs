//! Gatekeeper Identity - who is calling?
//!
//! Resolves the bearer token on a request into an
//! [`EntityData`](gatekeeper_core::EntityData):
//!
//! - **JWT** tokens (three `.`-separated parts) are verified locally against
//!   a set of RSA public keys keyed by `kid`; the username and groups claims
//!   become the caller's identity.
//! - **Legacy** opaque tokens are sent to the identity service, whose answer
//!   becomes the caller's user id.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gatekeeper_identity::{HttpIdentityClient, JwtConfig, JwtVerifier, TokenResolver};
//!
//! let verifier = JwtVerifier::new(&public_keys, JwtConfig::default())?;
//! let identity = HttpIdentityClient::new("http://localhost:8082", timeout)?;
//! let resolver = TokenResolver::new(Arc::new(verifier), Arc::new(identity));
//!
//! let entity = resolver.resolve(token).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod jwt;
pub mod legacy;
pub mod resolver;

pub use error::{IdentityClientError, JwtError, JwtResult, ResolveError};
pub use jwt::{JwtConfig, JwtVerifier, ALLOWED_ALGORITHMS};
pub use legacy::{HttpIdentityClient, IdentityClient, IdentityResponse};
pub use resolver::{looks_like_jwt, TokenResolver};
