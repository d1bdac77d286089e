// # HTTP Object Storage
//
// This crate provides an ObjectStorage implementation speaking plain HTTP to
// a path-style, S3-compatible endpoint (MinIO, Garage, a static web server
// with PUT/DELETE enabled, ...).
//
// ## Behavior
//
// - One HTTP request per operation
// - HTTP timeout configured (30 seconds)
// - Status codes mapped onto the core error kinds (403, 404, 5xx)
// - No retry logic: transient failures are surfaced to the engine, which
//   decides whether they abort the current domain
//
// ## Security Requirements
//
// - The bearer token NEVER appears in logs or Debug output
//
// ## Requests
//
// - Put object: PUT `{endpoint}/{bucket}/{key}`
// - Get object: GET `{endpoint}/{bucket}/{key}`
// - Delete object: DELETE `{endpoint}/{bucket}/{key}`

use async_trait::async_trait;
use certsync_core::config::ObjectStorageConfig;
use certsync_core::traits::{ObjectStorage, ObjectStorageFactory};
use certsync_core::{CollaboratorRegistry, Error, Result};
use reqwest::{StatusCode, Url};
use std::time::Duration;

/// Default HTTP timeout for storage requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP object storage
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the token.
pub struct HttpObjectStorage {
    /// Endpoint base URL; buckets are its first path segment
    endpoint: Url,

    /// Bearer token
    /// ⚠️ NEVER log this value
    token: Option<String>,

    /// HTTP client for storage requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the token
impl std::fmt::Debug for HttpObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpObjectStorage")
            .field("endpoint", &self.endpoint.as_str())
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl HttpObjectStorage {
    /// Create a new HTTP object storage
    ///
    /// # Parameters
    ///
    /// - `endpoint`: base URL, e.g. `https://storage.example.net`
    /// - `token`: optional bearer token
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::config(format!("Invalid storage endpoint {}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::config(format!(
                "Storage endpoint cannot be a base URL: {}",
                endpoint
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            token: token.filter(|t| !t.is_empty()),
            client,
        })
    }

    /// URL of `key` inside `bucket`
    ///
    /// Each segment is percent-encoded; `/` inside the key separates segments.
    fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
        if bucket.is_empty() || bucket.contains('/') {
            return Err(Error::invalid_input(format!("invalid bucket name: {:?}", bucket)));
        }
        if key.is_empty() || key.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
            return Err(Error::invalid_input(format!("invalid object key: {:?}", key)));
        }

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::config("Storage endpoint cannot be a base URL"))?
            .pop_if_empty()
            .push(bucket)
            .extend(key.split('/'));
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        method: reqwest::Method,
        bucket: &str,
        key: &str,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response> {
        let url = self.object_url(bucket, key)?;
        let what = format!("{} {}/{}", method, bucket, key);

        let mut builder = self.request(method, url);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::object_storage(format!("{}: HTTP request failed: {}", what, e)))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(map_status(status, &what, &error_text))
    }
}

/// Map a non-success status onto the core error kinds
fn map_status(status: StatusCode, what: &str, error_text: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::permission_denied(format!("{}: {}", what, status)),
        404 => Error::not_found(what.to_string()),
        429 => Error::object_storage(format!("{}: rate limited ({})", what, status)),
        500..=599 => Error::object_storage(format!(
            "{}: server error (transient): {} - {}",
            what, status, error_text
        )),
        _ => Error::object_storage(format!("{}: {} - {}", what, status, error_text)),
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let len = body.len();
        self.send(reqwest::Method::PUT, bucket, key, Some(body))
            .await?;
        tracing::debug!("PUT {}/{} ({} bytes)", bucket, key, len);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let response = self.send(reqwest::Method::GET, bucket, key, None).await?;
        let body = response.bytes().await.map_err(|e| {
            Error::object_storage(format!("GET {}/{}: failed to read body: {}", bucket, key, e))
        })?;
        Ok(body.to_vec())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        match self.send(reqwest::Method::DELETE, bucket, key, None).await {
            Ok(_) => Ok(()),
            // Deleting an absent object is not a failure
            Err(Error::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn storage_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP object storages
pub struct HttpObjectStorageFactory;

impl ObjectStorageFactory for HttpObjectStorageFactory {
    fn create(&self, config: &ObjectStorageConfig) -> Result<Box<dyn ObjectStorage>> {
        match config {
            ObjectStorageConfig::Http { endpoint, token } => {
                if endpoint.is_empty() {
                    return Err(Error::config("HTTP storage endpoint is required"));
                }
                Ok(Box::new(HttpObjectStorage::new(endpoint, token.clone())?))
            }
            _ => Err(Error::config("Invalid config for HTTP object storage")),
        }
    }
}

/// Register the HTTP object storage with a registry
///
/// # Example
///
/// ```rust
/// use certsync_core::CollaboratorRegistry;
///
/// let registry = CollaboratorRegistry::new();
/// certsync_storage_http::register(&registry);
/// assert!(registry.has_object_storage("http"));
/// ```
pub fn register(registry: &CollaboratorRegistry) {
    registry.register_object_storage("http", Box::new(HttpObjectStorageFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_creation() {
        let factory = HttpObjectStorageFactory;

        let config = ObjectStorageConfig::Http {
            endpoint: "https://storage.example.net".to_string(),
            token: Some("secret".to_string()),
        };
        let storage = factory.create(&config).unwrap();
        assert_eq!(storage.storage_name(), "http");

        assert!(factory.create(&ObjectStorageConfig::Memory).is_err());
    }

    #[test]
    fn test_factory_rejects_bad_endpoint() {
        let factory = HttpObjectStorageFactory;

        for endpoint in ["", "not a url", "mailto:ops@example.com"] {
            let config = ObjectStorageConfig::Http {
                endpoint: endpoint.to_string(),
                token: None,
            };
            assert!(factory.create(&config).is_err(), "endpoint {:?}", endpoint);
        }
    }

    #[test]
    fn test_object_url_is_path_style() {
        let storage = HttpObjectStorage::new("https://storage.example.net/", None).unwrap();

        let url = storage
            .object_url("example.com", ".well-known/acme-challenge/tok")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.example.net/example.com/.well-known/acme-challenge/tok"
        );

        let prefixed = HttpObjectStorage::new("https://storage.example.net/s3", None).unwrap();
        let url = prefixed.object_url("state", "certbot.tar.gz").unwrap();
        assert_eq!(url.as_str(), "https://storage.example.net/s3/state/certbot.tar.gz");
    }

    #[test]
    fn test_object_url_encodes_and_rejects() {
        let storage = HttpObjectStorage::new("https://storage.example.net", None).unwrap();

        let url = storage.object_url("state", "a b?.tar.gz").unwrap();
        assert_eq!(url.as_str(), "https://storage.example.net/state/a%20b%3F.tar.gz");

        for key in ["", "../x", "a//b", "a/./b"] {
            let err = storage.object_url("state", key).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "key {:?}", key);
        }
        assert!(storage.object_url("a/b", "k").is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "PUT a/b", ""),
            Error::PermissionDenied(_)
        ));
        assert!(map_status(StatusCode::NOT_FOUND, "GET a/b", "").is_not_found());
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, "GET a/b", "upstream"),
            Error::ObjectStorage(_)
        ));
    }

    #[test]
    fn test_token_not_exposed_in_debug() {
        let storage =
            HttpObjectStorage::new("https://storage.example.net", Some("secret_token_12345".into()))
                .unwrap();

        let debug_str = format!("{:?}", storage);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("HttpObjectStorage"));
        assert!(debug_str.contains("<REDACTED>"));
    }

    #[test]
    fn test_empty_token_is_dropped() {
        let storage = HttpObjectStorage::new("https://storage.example.net", Some(String::new()))
            .unwrap();
        assert!(storage.token.is_none());
    }
}
