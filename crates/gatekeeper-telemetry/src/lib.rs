//! Gatekeeper Telemetry - logging setup
//!
//! Every Gatekeeper crate logs through `tracing`. This crate installs the
//! subscriber that turns those events into output.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{create_env_filter, init_logging, LogConfig, LogFormat};
