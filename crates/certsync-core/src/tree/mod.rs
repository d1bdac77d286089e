//! Local authority state tree
//!
//! The authority client keeps its state under `<root>/config`:
//!
//! ```text
//! config/
//!   archive/<domain>/{cert,chain,privkey,fullchain}N.pem
//!   live/<domain>/{cert,chain,privkey,fullchain}.pem -> ../../archive/<domain>/...N.pem
//!   renewal/<domain>.conf
//!   accounts/...
//! ```
//!
//! This is the one place that knows that layout. The engine asks questions
//! (`has_local_cert`, `latest_archive_version`, `load_material`) and never
//! builds paths itself.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::Error;
use crate::traits::{AuthorityDirs, CertificateMaterial};

/// Credential files kept per lineage, in link-repair order
pub const CREDENTIAL_KINDS: [&str; 4] = ["cert", "chain", "privkey", "fullchain"];

/// Handle on the workspace holding the authority client's directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTree {
    root: PathBuf,
    dirs: AuthorityDirs,
}

impl StateTree {
    /// Tree rooted at `root` (config/work/logs live directly below it)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let dirs = AuthorityDirs::under(&root);
        Self { root, dirs }
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directories handed to the authority client
    pub fn dirs(&self) -> &AuthorityDirs {
        &self.dirs
    }

    /// The authority configuration tree (what gets archived)
    pub fn config_dir(&self) -> &Path {
        &self.dirs.config
    }

    fn live_dir(&self, domain: &str) -> PathBuf {
        self.dirs.config.join("live").join(domain)
    }

    fn archive_dir(&self, domain: &str) -> PathBuf {
        self.dirs.config.join("archive").join(domain)
    }

    fn live_path(&self, domain: &str, kind: &str) -> PathBuf {
        self.live_dir(domain).join(format!("{}.pem", kind))
    }

    /// Whether a certificate for `domain` is cached locally
    ///
    /// Absence is `Ok(false)`. A path that cannot be inspected (not a
    /// directory, permission denied) is an error, not absence.
    pub async fn has_local_cert(&self, domain: &str) -> Result<bool, Error> {
        let path = self.live_path(domain, "cert");
        fs::try_exists(&path).await.map_err(|e| {
            Error::state_tree(format!("Failed to inspect {}: {}", path.display(), e))
        })
    }

    /// Highest `N` among `archive/<domain>/certN.pem`, if any
    pub async fn latest_archive_version(&self, domain: &str) -> Result<Option<u32>, Error> {
        let dir = self.archive_dir(domain);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::state_tree(format!(
                    "Failed to read {}: {}",
                    dir.display(),
                    e
                )));
            }
        };

        let mut latest = None;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(version) = name.to_str().and_then(|n| archive_version(n, "cert")) {
                latest = latest.max(Some(version));
            }
        }

        Ok(latest)
    }

    /// Point every live link of `domain` at the newest archive version
    ///
    /// Restoring a snapshot turns live links into plain copies of whatever
    /// was current when it was taken. The authority client resolves live
    /// links during renewal, so they must be symlinks to the newest archive
    /// files before any renewal runs.
    ///
    /// Returns the version the links now point at.
    pub async fn repair_live_links(&self, domain: &str) -> Result<u32, Error> {
        let version = self.latest_archive_version(domain).await?.ok_or_else(|| {
            Error::state_tree(format!("No archived certificate versions for {}", domain))
        })?;

        let live_dir = self.live_dir(domain);
        fs::create_dir_all(&live_dir).await?;

        for kind in CREDENTIAL_KINDS {
            let file_name = format!("{}{}.pem", kind, version);
            if !fs::try_exists(self.archive_dir(domain).join(&file_name)).await? {
                return Err(Error::state_tree(format!(
                    "Archive for {} is missing {}",
                    domain, file_name
                )));
            }

            let link = self.live_path(domain, kind);
            match fs::remove_file(&link).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::state_tree(format!(
                        "Failed to remove {}: {}",
                        link.display(),
                        e
                    )));
                }
            }

            let target = Path::new("../../archive").join(domain).join(&file_name);
            symlink(&target, &link).await?;
        }

        debug!(domain = %domain, version, "Live links repaired");
        Ok(version)
    }

    /// Read the live certificate, key and chain for `domain`
    pub async fn load_material(&self, domain: &str) -> Result<CertificateMaterial, Error> {
        let read = |kind: &'static str| {
            let path = self.live_path(domain, kind);
            async move {
                fs::read(&path).await.map_err(|e| {
                    Error::state_tree(format!("Failed to read {}: {}", path.display(), e))
                })
            }
        };

        Ok(CertificateMaterial {
            certificate: read("cert").await?,
            private_key: read("privkey").await?,
            chain: read("chain").await?,
        })
    }

    /// Remove the whole workspace; a missing workspace is fine
    pub async fn remove(&self) -> Result<(), Error> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::state_tree(format!(
                "Failed to remove workspace {}: {}",
                self.root.display(),
                e
            ))),
        }
    }
}

/// `N` of a `<kind>N.pem` file name
fn archive_version(name: &str, kind: &str) -> Option<u32> {
    name.strip_prefix(kind)?
        .strip_suffix(".pem")?
        .parse::<u32>()
        .ok()
}

#[cfg(unix)]
async fn symlink(target: &Path, link: &Path) -> Result<(), Error> {
    fs::symlink(target, link).await.map_err(|e| {
        Error::state_tree(format!(
            "Failed to link {} -> {}: {}",
            link.display(),
            target.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
async fn symlink(_target: &Path, link: &Path) -> Result<(), Error> {
    Err(Error::state_tree(format!(
        "Symlinks are not supported on this platform ({})",
        link.display()
    )))
}

/// Write a lineage the way the authority client lays it out
///
/// Only used by tests that need a realistic tree.
#[cfg(test)]
pub(crate) async fn write_lineage(tree: &StateTree, domain: &str, versions: u32) {
    let archive = tree.archive_dir(domain);
    fs::create_dir_all(&archive).await.unwrap();
    for version in 1..=versions {
        for kind in CREDENTIAL_KINDS {
            fs::write(
                archive.join(format!("{}{}.pem", kind, version)),
                format!("{} v{}", kind, version),
            )
            .await
            .unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_archive_version_parsing() {
        assert_eq!(archive_version("cert1.pem", "cert"), Some(1));
        assert_eq!(archive_version("cert12.pem", "cert"), Some(12));
        assert_eq!(archive_version("cert.pem", "cert"), None);
        assert_eq!(archive_version("chain3.pem", "cert"), None);
        assert_eq!(archive_version("fullchain3.pem", "chain"), None);
        assert_eq!(archive_version("cert3.pem.bak", "cert"), None);
    }

    #[tokio::test]
    async fn test_latest_version_absent_tree() {
        let dir = tempdir().unwrap();
        let tree = StateTree::new(dir.path().join("certbot"));

        assert_eq!(tree.latest_archive_version("example.com").await.unwrap(), None);
        assert!(!tree.has_local_cert("example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_repair_points_links_at_newest_version() {
        let dir = tempdir().unwrap();
        let tree = StateTree::new(dir.path().join("certbot"));
        write_lineage(&tree, "example.com", 3).await;

        // Stale plain copy, as left behind by a snapshot restore
        let live = tree.live_dir("example.com");
        fs::create_dir_all(&live).await.unwrap();
        fs::write(live.join("cert.pem"), "cert v1").await.unwrap();

        let version = tree.repair_live_links("example.com").await.unwrap();
        assert_eq!(version, 3);

        for kind in CREDENTIAL_KINDS {
            let link = tree.live_path("example.com", kind);
            let meta = fs::symlink_metadata(&link).await.unwrap();
            assert!(meta.file_type().is_symlink(), "{} should be a symlink", kind);
            let content = fs::read_to_string(&link).await.unwrap();
            assert_eq!(content, format!("{} v3", kind));
        }

        assert!(tree.has_local_cert("example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_live_dir_is_an_error() {
        let dir = tempdir().unwrap();
        let tree = StateTree::new(dir.path().join("certbot"));

        // live/<domain> is a plain file, so live/<domain>/cert.pem cannot be inspected
        let live_parent = tree.config_dir().join("live");
        fs::create_dir_all(&live_parent).await.unwrap();
        fs::write(live_parent.join("example.com"), "not a directory").await.unwrap();

        let err = tree.has_local_cert("example.com").await.unwrap_err();
        assert!(matches!(err, Error::StateTree(_)));
    }

    #[tokio::test]
    async fn test_repair_without_archive_fails() {
        let dir = tempdir().unwrap();
        let tree = StateTree::new(dir.path().join("certbot"));

        let err = tree.repair_live_links("example.com").await.unwrap_err();
        assert!(matches!(err, Error::StateTree(_)));
    }

    #[tokio::test]
    async fn test_repair_with_incomplete_archive_fails() {
        let dir = tempdir().unwrap();
        let tree = StateTree::new(dir.path().join("certbot"));
        write_lineage(&tree, "example.com", 1).await;
        fs::remove_file(tree.archive_dir("example.com").join("chain1.pem"))
            .await
            .unwrap();

        assert!(tree.repair_live_links("example.com").await.is_err());
    }

    #[tokio::test]
    async fn test_load_material_reads_live_files() {
        let dir = tempdir().unwrap();
        let tree = StateTree::new(dir.path().join("certbot"));
        write_lineage(&tree, "example.com", 2).await;
        tree.repair_live_links("example.com").await.unwrap();

        let material = tree.load_material("example.com").await.unwrap();
        assert_eq!(material.certificate, b"cert v2");
        assert_eq!(material.private_key, b"privkey v2");
        assert_eq!(material.chain, b"chain v2");
    }

    #[tokio::test]
    async fn test_remove_tolerates_absence() {
        let dir = tempdir().unwrap();
        let tree = StateTree::new(dir.path().join("certbot"));

        tree.remove().await.unwrap();
        write_lineage(&tree, "example.com", 1).await;
        tree.remove().await.unwrap();
        assert!(!tree.root().exists());
    }
}
