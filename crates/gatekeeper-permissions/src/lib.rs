//! Gatekeeper Permissions - bundle cache and policy evaluation
//!
//! This crate holds the data side of authorisation decisions: the
//! permissions bundle, how it is fetched, how it is cached, and how a
//! caller's identity is matched against it.
//!
//! # Architecture
//!
//! ```text
//!                      ┌────────────────────────────┐
//!                      │   Permissions API          │
//!                      └──────────┬─────────────────┘
//!                                 │ GET /v1/permissions-bundle
//!                      ┌──────────▼─────────────────┐
//!                      │   HttpBundleStore          │
//!                      │   (fetch + retry)          │
//!                      └──────────┬─────────────────┘
//!                                 │ background refresh
//!                      ┌──────────▼─────────────────┐
//!                      │   BundleCache              │
//!                      │   (Arc<Bundle> swap)       │
//!                      └──────────┬─────────────────┘
//!      EntityData                 │ read
//!          │           ┌──────────▼─────────────────┐
//!          └──────────▶│   Checker                  │──▶ allow / deny
//!                      └────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gatekeeper_permissions::{BundleCache, CacheConfig, Checker, HttpBundleStore, StoreConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let store = HttpBundleStore::new(&StoreConfig::default())?;
//! let cache = Arc::new(BundleCache::new(Arc::new(store), CacheConfig::default()));
//! cache.start(&CancellationToken::new())?;
//!
//! let checker = Checker::new(cache.clone());
//! let allowed = checker.has_permission(&entity, "users.add", None)?;
//!
//! cache.close().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bundle;
pub mod cache;
pub mod checker;
pub mod config;
pub mod error;
pub mod store;

// Re-exports for convenience
pub use bundle::{Attributes, Bundle, Condition, Operator, Policy};
pub use cache::{BundleCache, CacheStatus};
pub use checker::{Checker, PermissionsChecker};
pub use config::{CacheConfig, StoreConfig};
pub use error::{PermissionsError, PermissionsResult};
pub use store::{BundleStore, HttpBundleStore};
