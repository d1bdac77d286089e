// # File Object Storage
//
// Directory-backed implementation of ObjectStorage.
//
// ## Layout
//
// ```text
// <root>/
//   state-bucket/
//     certbot.tar.gz
//   example.com/
//     .well-known/acme-challenge/<token>
// ```
//
// Each bucket is a directory directly under the root. Buckets are never
// created implicitly: writing into a missing bucket is `NotFound`, exactly
// like a remote store. This keeps the challenge permission probe honest
// when the bucket root is served by a local web server.
//
// ## Crash Safety
//
// - Atomic writes: objects are written to a temporary sibling, then renamed

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::config::ObjectStorageConfig;
use crate::traits::{ObjectStorage, ObjectStorageFactory};

/// Directory-backed object storage
#[derive(Debug, Clone)]
pub struct FileObjectStorage {
    root: PathBuf,
}

impl FileObjectStorage {
    /// Create a storage rooted at `root`
    ///
    /// The root itself is not created; buckets are its subdirectories.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory containing the buckets
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve and check the bucket directory
    async fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, Error> {
        validate_segment(bucket)?;
        let dir = self.root.join(bucket);
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(Error::not_found(format!("bucket {} is not a directory", bucket))),
            Err(e) => Err(map_io(e, &format!("bucket {}", bucket))),
        }
    }

    /// Resolve the object path inside an existing bucket
    async fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, Error> {
        let dir = self.bucket_dir(bucket).await?;
        let key_path = Path::new(key);

        if key.is_empty()
            || !key_path
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(Error::invalid_input(format!("invalid object key: {:?}", key)));
        }

        Ok(dir.join(key_path))
    }
}

fn validate_segment(bucket: &str) -> Result<(), Error> {
    if bucket.is_empty() || bucket == "." || bucket == ".." || bucket.contains(['/', '\\']) {
        return Err(Error::invalid_input(format!("invalid bucket name: {:?}", bucket)));
    }
    Ok(())
}

fn map_io(e: std::io::Error, what: &str) -> Error {
    match e.kind() {
        ErrorKind::NotFound => Error::not_found(what.to_string()),
        ErrorKind::PermissionDenied => Error::permission_denied(what.to_string()),
        _ => Error::object_storage(format!("{}: {}", what, e)),
    }
}

#[async_trait]
impl ObjectStorage for FileObjectStorage {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), Error> {
        let path = self.object_path(bucket, key).await?;
        let what = format!("{}/{}", bucket, key);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(e, &what))?;
        }

        let mut temp_path = path.clone().into_os_string();
        temp_path.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let temp_path = PathBuf::from(temp_path);

        {
            let mut file = fs::File::create(&temp_path)
                .await
                .map_err(|e| map_io(e, &what))?;
            file.write_all(&body).await.map_err(|e| map_io(e, &what))?;
            file.flush().await.map_err(|e| map_io(e, &what))?;
        }

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(map_io(e, &what));
        }

        tracing::trace!("Stored object {} ({} bytes)", what, body.len());
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, Error> {
        let path = self.object_path(bucket, key).await?;
        fs::read(&path)
            .await
            .map_err(|e| map_io(e, &format!("{}/{}", bucket, key)))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), Error> {
        let path = self.object_path(bucket, key).await?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io(e, &format!("{}/{}", bucket, key))),
        }
    }

    fn storage_name(&self) -> &'static str {
        "file"
    }
}

/// Factory for directory-backed object storage
pub struct FileObjectStorageFactory;

impl ObjectStorageFactory for FileObjectStorageFactory {
    fn create(&self, config: &ObjectStorageConfig) -> Result<Box<dyn ObjectStorage>, Error> {
        match config {
            ObjectStorageConfig::File { root } => Ok(Box::new(FileObjectStorage::new(root))),
            _ => Err(Error::config("Invalid config for file object storage")),
        }
    }
}
