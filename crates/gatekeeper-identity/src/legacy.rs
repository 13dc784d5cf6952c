//! Legacy opaque service tokens.
//!
//! Opaque tokens are not verified locally. They are handed to the identity
//! service, which answers with the identifier the token belongs to.

use std::time::Duration;

use gatekeeper_core::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::IdentityClientError;

/// Path of the identity endpoint on the identity service.
pub const IDENTITY_PATH: &str = "/identity";

/// Default identity service URL.
pub const DEFAULT_IDENTITY_URL: &str = "http://localhost:8082";

/// Identity service answer for an accepted token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityResponse {
    /// The user or service the token belongs to.
    pub identifier: String,
}

/// Resolves an opaque token to an identifier.
pub trait IdentityClient: Send + Sync + 'static {
    /// Ask the identity service who `token` belongs to.
    fn check_token_identity<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<IdentityResponse, IdentityClientError>>;
}

/// [`IdentityClient`] calling `GET {url}/identity` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    client: reqwest::Client,
    url: String,
}

impl HttpIdentityClient {
    /// Create a client for the identity service at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, IdentityClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a client sharing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), IDENTITY_PATH),
        }
    }

    /// The endpoint this client calls.
    pub fn url(&self) -> &str {
        &self.url
    }

    #[instrument(skip_all, fields(url = %self.url))]
    async fn check(&self, token: &str) -> Result<IdentityResponse, IdentityClientError> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "identity service rejected token");
            return Err(IdentityClientError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let identity: IdentityResponse = response.json().await?;
        if identity.identifier.is_empty() {
            return Err(IdentityClientError::EmptyIdentifier);
        }

        debug!(identifier = %identity.identifier, "identity service accepted token");
        Ok(identity)
    }
}

impl IdentityClient for HttpIdentityClient {
    fn check_token_identity<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<IdentityResponse, IdentityClientError>> {
        Box::pin(self.check(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpIdentityClient {
        HttpIdentityClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_identity_url() {
        let client =
            HttpIdentityClient::new("http://zebedee:8082/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url(), "http://zebedee:8082/identity");
    }

    #[tokio::test]
    async fn test_accepted_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/identity"))
            .and(header("Authorization", "Bearer service-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"identifier": "dp-import"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let identity = client_for(&server)
            .check_token_identity("service-token")
            .await
            .unwrap();
        assert_eq!(identity.identifier, "dp-import");
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/identity"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .check_token_identity("bad-token")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityClientError::UnexpectedStatus { status: 401 }));
    }

    #[tokio::test]
    async fn test_empty_identifier() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/identity"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"identifier": ""})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .check_token_identity("token")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityClientError::EmptyIdentifier));
    }

    #[tokio::test]
    async fn test_garbage_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/identity"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .check_token_identity("token")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityClientError::Decode(_)));
    }
}
