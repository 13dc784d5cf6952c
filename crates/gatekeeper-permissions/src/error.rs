//! Error types for the permissions crate.

use thiserror::Error;

/// Result type for permissions operations.
pub type PermissionsResult<T> = Result<T, PermissionsError>;

/// Errors that can occur while fetching, caching or evaluating permissions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PermissionsError {
    /// The permissions API could not be reached.
    #[error("permissions API transport error: {0}")]
    Transport(String),

    /// The permissions API answered with a non-success status.
    #[error("permissions API returned unexpected status {status}")]
    UnexpectedStatus {
        /// HTTP status code of the final response.
        status: u16,
    },

    /// The response body was empty or not a valid bundle.
    #[error("failed to decode permissions bundle: {0}")]
    Decode(String),

    /// No bundle is cached, either never fetched or evicted as stale.
    #[error("permissions bundle not cached")]
    NotCached,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The background refresher did not shut down cleanly.
    #[error("permissions cache shutdown failed: {0}")]
    Shutdown(String),
}

impl PermissionsError {
    /// Create an unexpected status error.
    pub const fn unexpected_status(status: u16) -> Self {
        Self::UnexpectedStatus { status }
    }

    /// Check if this error is worth retrying the fetch for.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::UnexpectedStatus { .. })
    }

    /// Check if this is a missing-bundle error.
    pub const fn is_not_cached(&self) -> bool {
        matches!(self, Self::NotCached)
    }
}

impl From<reqwest::Error> for PermissionsError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
