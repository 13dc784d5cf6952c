//! Bundle fetching from the permissions API.

use std::time::Duration;

use gatekeeper_core::BoxFuture;
use tracing::{debug, info, instrument, warn};

use crate::bundle::Bundle;
use crate::config::StoreConfig;
use crate::error::{PermissionsError, PermissionsResult};

/// A source of permissions bundles.
///
/// Implementations must not mutate shared state; a fetch is a read.
pub trait BundleStore: Send + Sync + 'static {
    /// Fetch the current bundle.
    fn fetch_bundle(&self) -> BoxFuture<'_, PermissionsResult<Bundle>>;
}

/// Fetches bundles from `GET {host}/v1/permissions-bundle`.
///
/// Transport failures and non-2xx responses are retried following
/// [`StoreConfig::retry_delays`]. Decode failures are returned immediately.
#[derive(Debug, Clone)]
pub struct HttpBundleStore {
    client: reqwest::Client,
    url: String,
    retry_delays: Vec<Duration>,
}

impl HttpBundleStore {
    /// Create a store with its own HTTP client.
    pub fn new(config: &StoreConfig) -> PermissionsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PermissionsError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a store sharing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, config: &StoreConfig) -> Self {
        Self {
            client,
            url: config.bundle_url(),
            retry_delays: config.retry_delays.clone(),
        }
    }

    /// The endpoint this store fetches from.
    pub fn url(&self) -> &str {
        &self.url
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_with_retries(&self) -> PermissionsResult<Bundle> {
        let mut delays = self.retry_delays.iter();
        let mut attempt = 1;

        loop {
            match self.fetch_once().await {
                Ok(body) => {
                    let bundle = Bundle::from_json(&body)?;
                    info!(
                        attempt,
                        permissions = bundle.len(),
                        "fetched permissions bundle"
                    );
                    return Ok(bundle);
                }
                Err(err) if err.is_retryable() => match delays.next() {
                    Some(delay) => {
                        warn!(
                            attempt,
                            error = %err,
                            retry_in_ms = delay.as_millis(),
                            "permissions bundle fetch failed, retrying"
                        );
                        tokio::time::sleep(*delay).await;
                        attempt += 1;
                    }
                    None => {
                        warn!(
                            attempt,
                            error = %err,
                            "permissions bundle fetch failed, retries exhausted"
                        );
                        return Err(err);
                    }
                },
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self) -> PermissionsResult<Vec<u8>> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "permissions API returned error status");
            return Err(PermissionsError::unexpected_status(status.as_u16()));
        }

        let body = response.bytes().await?;
        Ok(body.to_vec())
    }
}

impl BundleStore for HttpBundleStore {
    fn fetch_bundle(&self) -> BoxFuture<'_, PermissionsResult<Bundle>> {
        Box::pin(self.fetch_with_retries())
    }
}
