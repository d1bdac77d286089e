//! State tree synchronization
//!
//! The execution environment has no durable disk, so the authority tree is
//! carried between runs as a single gzip-compressed tar object:
//!
//! ```text
//!  restore()                               archive()
//!  storage ──get──▶ <root>.tar.gz ──unpack──▶ <root>/config ──pack──▶ <root>.tar.gz ──put──▶ storage
//! ```
//!
//! Packing follows symlinks, so live links are stored as plain copies of
//! whatever version was current. [`Synchronizer::repair_symlinks`] restores
//! the link convention before a renewal needs it.
//!
//! There is exactly one snapshot, overwritten by every run. Nothing guards
//! against two overlapping runs racing on it.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::Error;
use crate::config::SnapshotConfig;
use crate::traits::ObjectStorage;
use crate::tree::StateTree;

/// What `restore()` found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// A snapshot was downloaded and unpacked
    Restored {
        /// Compressed snapshot size
        bytes: usize,
    },
    /// No usable snapshot; processing starts from an empty tree
    Empty {
        /// Why the snapshot was not used
        reason: String,
    },
}

/// Moves the authority tree between the workspace and object storage
#[derive(Clone)]
pub struct Synchronizer {
    storage: Arc<dyn ObjectStorage>,
    snapshot: SnapshotConfig,
    tree: StateTree,
}

impl Synchronizer {
    /// Create a synchronizer for `tree` backed by the snapshot at `snapshot`
    pub fn new(storage: Arc<dyn ObjectStorage>, snapshot: SnapshotConfig, tree: StateTree) -> Self {
        Self {
            storage,
            snapshot,
            tree,
        }
    }

    /// The tree this synchronizer manages
    pub fn tree(&self) -> &StateTree {
        &self.tree
    }

    /// Local file the snapshot passes through (`<root>.tar.gz`)
    pub fn artifact_path(&self) -> PathBuf {
        let root = self.tree.root();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "certsync".to_string());
        root.with_file_name(format!("{}.tar.gz", name))
    }

    /// Download and unpack the snapshot into the workspace root
    ///
    /// Any failure to fetch the snapshot (missing object, missing bucket,
    /// transient error) is logged and reported as [`RestoreOutcome::Empty`].
    /// Only a snapshot that was fetched but cannot be unpacked is an error.
    pub async fn restore(&self) -> Result<RestoreOutcome, Error> {
        let body = match self
            .storage
            .get(&self.snapshot.bucket, &self.snapshot.key)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                if e.is_not_found() {
                    info!(
                        "No snapshot at {}/{}, starting from an empty tree",
                        self.snapshot.bucket, self.snapshot.key
                    );
                } else {
                    warn!(
                        "Failed to fetch snapshot {}/{}: {}. Starting from an empty tree.",
                        self.snapshot.bucket, self.snapshot.key, e
                    );
                }
                return Ok(RestoreOutcome::Empty {
                    reason: e.to_string(),
                });
            }
        };

        let bytes = body.len();
        let artifact = self.artifact_path();
        if let Some(parent) = artifact.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&artifact, &body).await?;
        drop(body);

        let root = self.tree.root().to_path_buf();
        let unpack_from = artifact.clone();
        let unpacked = tokio::task::spawn_blocking(move || unpack(&unpack_from, &root))
            .await
            .map_err(|e| Error::archive(format!("Unpack task failed: {}", e)));

        remove_artifact(&artifact).await;
        unpacked??;

        info!("Restored snapshot ({} bytes) into {}", bytes, self.tree.root().display());
        Ok(RestoreOutcome::Restored { bytes })
    }

    /// Pack the config tree and upload it over the previous snapshot
    ///
    /// Returns the compressed snapshot size.
    pub async fn archive(&self) -> Result<usize, Error> {
        let artifact = self.artifact_path();
        if let Some(parent) = artifact.parent() {
            fs::create_dir_all(parent).await?;
        }

        let config_dir = self.tree.config_dir().to_path_buf();
        let pack_into = artifact.clone();
        let packed = tokio::task::spawn_blocking(move || pack(&config_dir, &pack_into))
            .await
            .map_err(|e| Error::archive(format!("Pack task failed: {}", e)));

        let uploaded = match packed {
            Ok(Ok(())) => self.upload(&artifact).await,
            Ok(Err(e)) | Err(e) => Err(e),
        };

        remove_artifact(&artifact).await;
        let bytes = uploaded?;

        info!(
            "Archived {} to {}/{} ({} bytes)",
            self.tree.config_dir().display(),
            self.snapshot.bucket,
            self.snapshot.key,
            bytes
        );
        Ok(bytes)
    }

    async fn upload(&self, artifact: &Path) -> Result<usize, Error> {
        let body = fs::read(artifact).await?;
        let bytes = body.len();
        self.storage
            .put(&self.snapshot.bucket, &self.snapshot.key, body)
            .await?;
        Ok(bytes)
    }

    /// Re-link `live/<domain>/*.pem` to the newest archive version
    pub async fn repair_symlinks(&self, domain: &str) -> Result<u32, Error> {
        self.tree.repair_live_links(domain).await
    }

    /// Remove the whole local workspace; absence is fine
    pub async fn cleanup_workspace(&self) -> Result<(), Error> {
        self.tree.remove().await?;
        debug!("Workspace {} removed", self.tree.root().display());
        Ok(())
    }
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("storage", &self.storage.storage_name())
            .field("snapshot", &self.snapshot)
            .field("tree", &self.tree)
            .finish()
    }
}

async fn remove_artifact(artifact: &Path) {
    if let Err(e) = fs::remove_file(artifact).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove {}: {}", artifact.display(), e);
    }
}

/// Pack `config_dir` as `config/...` into a tar.gz at `artifact`
///
/// A missing config dir produces an empty archive.
fn pack(config_dir: &Path, artifact: &Path) -> Result<(), Error> {
    let file = std::fs::File::create(artifact)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(true);

    if config_dir.is_dir() {
        builder
            .append_dir_all("config", config_dir)
            .map_err(|e| Error::archive(format!("Failed to pack {}: {}", config_dir.display(), e)))?;
    }

    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| Error::archive(format!("Failed to finish snapshot: {}", e)))?;
    Ok(())
}

/// Unpack the tar.gz at `artifact` into `root`
fn unpack(artifact: &Path, root: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(root)?;
    let file = std::fs::File::open(artifact)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive
        .unpack(root)
        .map_err(|e| Error::archive(format!("Failed to unpack snapshot: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStorage;
    use crate::tree::{CREDENTIAL_KINDS, write_lineage};
    use tempfile::tempdir;

    fn snapshot() -> SnapshotConfig {
        SnapshotConfig {
            bucket: "state".to_string(),
            key: "certbot.tar.gz".to_string(),
        }
    }

    async fn synchronizer(root: &Path) -> (Synchronizer, MemoryObjectStorage) {
        let storage = MemoryObjectStorage::new();
        storage.create_bucket("state").await;
        let sync = Synchronizer::new(
            Arc::new(storage.clone()),
            snapshot(),
            StateTree::new(root.join("certbot")),
        );
        (sync, storage)
    }

    #[tokio::test]
    async fn test_restore_without_snapshot_is_empty() {
        let dir = tempdir().unwrap();
        let (sync, _storage) = synchronizer(dir.path()).await;

        let outcome = sync.restore().await.unwrap();
        assert!(matches!(outcome, RestoreOutcome::Empty { .. }));
        assert!(!sync.tree().has_local_cert("example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_restore_without_bucket_is_empty() {
        let dir = tempdir().unwrap();
        let sync = Synchronizer::new(
            Arc::new(MemoryObjectStorage::new()),
            snapshot(),
            StateTree::new(dir.path().join("certbot")),
        );

        let outcome = sync.restore().await.unwrap();
        assert!(matches!(outcome, RestoreOutcome::Empty { .. }));
    }

    #[tokio::test]
    async fn test_archive_restore_round_trip_materializes_links() {
        let dir = tempdir().unwrap();
        let (sync, storage) = synchronizer(dir.path()).await;
        let tree = sync.tree().clone();

        write_lineage(&tree, "example.com", 2).await;
        tree.repair_live_links("example.com").await.unwrap();
        fs::create_dir_all(tree.config_dir().join("renewal"))
            .await
            .unwrap();
        fs::write(
            tree.config_dir().join("renewal/example.com.conf"),
            b"version = 2.11.0\n",
        )
        .await
        .unwrap();

        let bytes = sync.archive().await.unwrap();
        assert!(bytes > 0);
        assert!(storage.contains("state", "certbot.tar.gz").await);
        assert!(!sync.artifact_path().exists());

        sync.cleanup_workspace().await.unwrap();
        assert!(!tree.root().exists());

        let outcome = sync.restore().await.unwrap();
        assert_eq!(outcome, RestoreOutcome::Restored { bytes });
        assert!(!sync.artifact_path().exists());

        let renewal = fs::read(tree.config_dir().join("renewal/example.com.conf"))
            .await
            .unwrap();
        assert_eq!(renewal, b"version = 2.11.0\n");

        for kind in CREDENTIAL_KINDS {
            let live = tree.config_dir().join("live/example.com").join(format!("{}.pem", kind));
            let meta = fs::symlink_metadata(&live).await.unwrap();
            assert!(!meta.file_type().is_symlink(), "{} came back as a link", kind);
            assert_eq!(
                fs::read_to_string(&live).await.unwrap(),
                format!("{} v2", kind)
            );

            let archived = tree
                .config_dir()
                .join("archive/example.com")
                .join(format!("{}1.pem", kind));
            assert_eq!(fs::read_to_string(&archived).await.unwrap(), format!("{} v1", kind));
        }

        // Repair brings the link convention back
        assert_eq!(sync.repair_symlinks("example.com").await.unwrap(), 2);
        let live = tree.config_dir().join("live/example.com/cert.pem");
        assert!(fs::symlink_metadata(&live).await.unwrap().file_type().is_symlink());
    }

    #[tokio::test]
    async fn test_archive_of_missing_tree_uploads_empty_snapshot() {
        let dir = tempdir().unwrap();
        let (sync, storage) = synchronizer(dir.path()).await;

        sync.archive().await.unwrap();
        assert!(storage.contains("state", "certbot.tar.gz").await);

        let outcome = sync.restore().await.unwrap();
        assert!(matches!(outcome, RestoreOutcome::Restored { .. }));
        assert!(!sync.tree().has_local_cert("example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_archive_upload_failure_is_reported() {
        let dir = tempdir().unwrap();
        let (sync, storage) = synchronizer(dir.path()).await;
        storage.deny_put("state").await;

        assert!(matches!(
            sync.archive().await,
            Err(Error::PermissionDenied(_))
        ));
        assert!(!sync.artifact_path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let dir = tempdir().unwrap();
        let (sync, storage) = synchronizer(dir.path()).await;
        storage
            .put("state", "certbot.tar.gz", b"definitely not gzip".to_vec())
            .await
            .unwrap();

        assert!(matches!(sync.restore().await, Err(Error::Archive(_))));
        assert!(!sync.artifact_path().exists());
    }

    #[test]
    fn test_artifact_sits_next_to_workspace() {
        let sync = Synchronizer::new(
            Arc::new(MemoryObjectStorage::new()),
            snapshot(),
            StateTree::new("/tmp/certbot"),
        );
        assert_eq!(sync.artifact_path(), PathBuf::from("/tmp/certbot.tar.gz"));
    }
}
