//! Gatekeeper Middleware - HTTP authorisation for handlers
//!
//! Wraps request handlers so they only run for callers holding a named
//! permission. The caller is identified from the bearer token, the decision
//! is taken against the cached permissions bundle, and the resolved
//! [`EntityData`](gatekeeper_core::EntityData) is placed in the request
//! extensions for the handler to read.
//!
//! # Example
//!
//! ```ignore
//! use gatekeeper_middleware::{Authorisation, CollectionIdExtractor, Handler};
//!
//! let add_user = authorisation.require("users.add", |request| async move {
//!     // only admins get here
//!     Response::new(Full::new(Bytes::from("created")))
//! });
//!
//! let read = authorisation.require_with_attributes(
//!     "legacy.read",
//!     CollectionIdExtractor,
//!     read_handler,
//! );
//!
//! let response = add_user.call(request).await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod attributes;
pub mod authorisation;
pub mod types;

pub use attributes::{
    AttributeError, AttributeExtractor, CollectionIdExtractor, FnExtractor, COLLECTION_ID_ATTRIBUTE,
    COLLECTION_ID_HEADER,
};
pub use authorisation::{
    bearer_token, Authorisation, PermissionCheckingMiddleware, Protected, Rejection,
    HEALTH_MSG_PASSTHROUGH,
};
pub use types::{Handler, Request, Response, ResponseExt};
