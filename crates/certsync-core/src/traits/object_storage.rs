// # Object Storage Trait
//
// Defines the narrow interface to the object-storage collaborator.
//
// Two kinds of buckets are addressed through it:
//
// - The snapshot bucket, holding the archived authority state tree
// - One bucket per managed domain (bucket name == domain name), serving
//   `.well-known/acme-challenge/<token>` for HTTP-01 validation
//
// ## Implementations
//
// - In-memory: `storage::MemoryObjectStorage`
// - Directory-backed: `storage::FileObjectStorage`
// - HTTP (S3-compatible, path-style): `certsync-storage-http` crate
//
// ## Usage
//
// ```rust,ignore
// use certsync_core::ObjectStorage;
//
// async fn publish(storage: &dyn ObjectStorage) -> certsync_core::Result<()> {
//     storage
//         .put("example.com", ".well-known/acme-challenge/abc", b"abc.xyz".to_vec())
//         .await?;
//     storage.delete("example.com", ".well-known/acme-challenge/abc").await
// }
// ```

use async_trait::async_trait;

/// Trait for object storage implementations
///
/// # Error Contract
///
/// Implementations MUST distinguish absence from failure:
///
/// - Missing object on `get` → `Error::NotFound`
/// - Missing bucket → `Error::NotFound`
/// - Access refused → `Error::PermissionDenied`
/// - Anything else (network, server) → `Error::ObjectStorage` or `Error::Provider`
///
/// The synchronizer relies on this to treat a missing snapshot as a first
/// run while still surfacing genuine failures.
///
/// # Retries
///
/// Implementations own their own timeouts. The engine never retries a
/// storage call; a failed call is reported to the caller as-is.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `body` under `key` in `bucket`, overwriting any previous object
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), crate::Error>;

    /// Fetch the object stored under `key` in `bucket`
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<u8>)`: The object bytes
    /// - `Err(Error::NotFound)`: No such object or bucket
    /// - `Err(Error)`: Any other failure
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, crate::Error>;

    /// Delete the object stored under `key` in `bucket`
    ///
    /// Deleting a missing key inside an existing bucket is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), crate::Error>;

    /// Get the backend name (for logging/debugging)
    fn storage_name(&self) -> &'static str;
}

/// Helper trait for constructing object storage backends from configuration
pub trait ObjectStorageFactory: Send + Sync {
    /// Create an ObjectStorage instance from configuration
    fn create(
        &self,
        config: &crate::config::ObjectStorageConfig,
    ) -> Result<Box<dyn ObjectStorage>, crate::Error>;
}
