// # Memory Object Storage
//
// In-memory implementation of ObjectStorage.
//
// ## Purpose
//
// Provides a fast, non-persistent storage backend. Buckets must be created
// explicitly, mirroring real object stores where writing to a missing bucket
// fails. Permission denial can be simulated per bucket.
//
// ## When to Use
//
// - Testing environments
// - Dry runs where nothing should survive the process

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::ObjectStorageConfig;
use crate::traits::{ObjectStorage, ObjectStorageFactory};

#[derive(Debug, Default)]
struct MemoryBuckets {
    buckets: HashMap<String, HashMap<String, Vec<u8>>>,
    deny_put: HashSet<String>,
    deny_delete: HashSet<String>,
}

/// In-memory object storage implementation
///
/// Clones share the same underlying buckets.
///
/// # Example
///
/// ```rust,no_run
/// use certsync_core::storage::MemoryObjectStorage;
/// use certsync_core::traits::ObjectStorage;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let storage = MemoryObjectStorage::new();
///     storage.create_bucket("state").await;
///
///     storage.put("state", "certbot.tar.gz", vec![1, 2, 3]).await?;
///     assert_eq!(storage.get("state", "certbot.tar.gz").await?, vec![1, 2, 3]);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStorage {
    inner: Arc<RwLock<MemoryBuckets>>,
}

impl MemoryObjectStorage {
    /// Create a new storage with no buckets
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty bucket (no-op if it exists)
    pub async fn create_bucket(&self, bucket: &str) {
        let mut guard = self.inner.write().await;
        guard.buckets.entry(bucket.to_string()).or_default();
    }

    /// Refuse future puts into `bucket`
    pub async fn deny_put(&self, bucket: &str) {
        self.inner.write().await.deny_put.insert(bucket.to_string());
    }

    /// Refuse future deletes from `bucket`
    pub async fn deny_delete(&self, bucket: &str) {
        self.inner
            .write()
            .await
            .deny_delete
            .insert(bucket.to_string());
    }

    /// Number of objects in `bucket` (0 if the bucket does not exist)
    pub async fn object_count(&self, bucket: &str) -> usize {
        let guard = self.inner.read().await;
        guard.buckets.get(bucket).map(|b| b.len()).unwrap_or(0)
    }

    /// Whether `bucket` holds an object under `key`
    pub async fn contains(&self, bucket: &str, key: &str) -> bool {
        let guard = self.inner.read().await;
        guard
            .buckets
            .get(bucket)
            .is_some_and(|b| b.contains_key(key))
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if guard.deny_put.contains(bucket) {
            return Err(Error::permission_denied(format!("put {}/{}", bucket, key)));
        }
        let objects = guard
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::not_found(format!("bucket {}", bucket)))?;
        objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, Error> {
        let guard = self.inner.read().await;
        guard
            .buckets
            .get(bucket)
            .ok_or_else(|| Error::not_found(format!("bucket {}", bucket)))?
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("object {}/{}", bucket, key)))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if guard.deny_delete.contains(bucket) {
            return Err(Error::permission_denied(format!(
                "delete {}/{}",
                bucket, key
            )));
        }
        let objects = guard
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::not_found(format!("bucket {}", bucket)))?;
        objects.remove(key);
        Ok(())
    }

    fn storage_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for in-memory object storage
pub struct MemoryObjectStorageFactory;

impl ObjectStorageFactory for MemoryObjectStorageFactory {
    fn create(&self, config: &ObjectStorageConfig) -> Result<Box<dyn ObjectStorage>, Error> {
        match config {
            ObjectStorageConfig::Memory => Ok(Box::new(MemoryObjectStorage::new())),
            _ => Err(Error::config("Invalid config for memory object storage")),
        }
    }
}
