//! Request attribute extraction.
//!
//! Attributes are the contextual values conditions are evaluated against,
//! such as the collection a request targets.

use gatekeeper_permissions::Attributes;
use thiserror::Error;

use crate::types::Request;

/// Header read by [`CollectionIdExtractor`].
pub const COLLECTION_ID_HEADER: &str = "Collection-Id";

/// Attribute name written by [`CollectionIdExtractor`].
pub const COLLECTION_ID_ATTRIBUTE: &str = "collection_id";

/// Failure to derive attributes from a request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttributeError {
    /// A header was present but not valid text.
    #[error("header {name} is not valid: {message}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// Error message.
        message: String,
    },

    /// Any other extraction failure.
    #[error("attribute extraction failed: {0}")]
    Other(String),
}

/// Derives policy attributes from a request.
pub trait AttributeExtractor: Send + Sync + 'static {
    /// Extract attributes from `request`.
    fn extract(&self, request: &Request) -> Result<Attributes, AttributeError>;
}

/// Maps the `Collection-Id` header to the `collection_id` attribute.
///
/// A missing header yields no attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionIdExtractor;

impl AttributeExtractor for CollectionIdExtractor {
    fn extract(&self, request: &Request) -> Result<Attributes, AttributeError> {
        let mut attributes = Attributes::new();

        if let Some(value) = request.headers().get(COLLECTION_ID_HEADER) {
            let value = value.to_str().map_err(|e| AttributeError::InvalidHeader {
                name: COLLECTION_ID_HEADER.to_string(),
                message: e.to_string(),
            })?;
            if !value.is_empty() {
                attributes.insert(COLLECTION_ID_ATTRIBUTE.to_string(), value.to_string());
            }
        }

        Ok(attributes)
    }
}

/// An extractor built from a closure.
///
/// ```ignore
/// let extractor = FnExtractor::new(|request: &Request| {
///     Ok(Attributes::from([("path".to_string(), request.uri().path().to_string())]))
/// });
/// ```
pub struct FnExtractor<F> {
    func: F,
}

impl<F> FnExtractor<F> {
    /// Wrap `func` as an extractor.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> AttributeExtractor for FnExtractor<F>
where
    F: Fn(&Request) -> Result<Attributes, AttributeError> + Send + Sync + 'static,
{
    fn extract(&self, request: &Request) -> Result<Attributes, AttributeError> {
        (self.func)(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::HeaderValue;
    use http_body_util::Full;

    fn request(collection_id: Option<HeaderValue>) -> Request {
        let mut builder = http::Request::builder().uri("/datasets/cpih");
        if let Some(value) = collection_id {
            builder = builder.header(COLLECTION_ID_HEADER, value);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    #[test]
    fn test_collection_id_present() {
        let attributes = CollectionIdExtractor
            .extract(&request(Some(HeaderValue::from_static("collection765"))))
            .unwrap();
        assert_eq!(attributes.get("collection_id").map(String::as_str), Some("collection765"));
    }

    #[test]
    fn test_collection_id_missing() {
        let attributes = CollectionIdExtractor.extract(&request(None)).unwrap();
        assert!(attributes.is_empty());
    }

    #[test]
    fn test_collection_id_invalid() {
        let value = HeaderValue::from_bytes(b"caf\xe9").unwrap();
        let err = CollectionIdExtractor.extract(&request(Some(value))).unwrap_err();
        assert!(matches!(err, AttributeError::InvalidHeader { .. }));
    }

    #[test]
    fn test_fn_extractor() {
        let extractor = FnExtractor::new(|request: &Request| -> Result<Attributes, AttributeError> {
            Ok(Attributes::from([(
                "path".to_string(),
                request.uri().path().to_string(),
            )]))
        });
        let attributes = extractor.extract(&request(None)).unwrap();
        assert_eq!(attributes["path"], "/datasets/cpih");
    }
}
