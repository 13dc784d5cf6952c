//! # Gatekeeper Core
//!
//! Types shared across the Gatekeeper crates:
//!
//! - [`EntityData`]: the resolved identity of the current caller
//! - [`HealthCheck`] / [`HealthState`]: tri-state health reporting
//! - [`BoxFuture`]: the boxed future used at every async trait seam

#![doc(html_root_url = "https://docs.rs/gatekeeper-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod health;
pub mod identity;

use std::future::Future;
use std::pin::Pin;

pub use health::{HealthCheck, HealthState};
pub use identity::EntityData;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
