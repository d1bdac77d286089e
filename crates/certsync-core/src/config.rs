//! Configuration types for the certsync system
//!
//! This module defines all configuration structures used throughout the crate.
//! Loading from the environment happens in the `certsyncd` binary; the core
//! only consumes already-parsed values.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Let's Encrypt staging directory
pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Let's Encrypt production directory
pub const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Main certsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertSyncConfig {
    /// Domains to manage, processed in this order
    #[serde(default)]
    pub domains: Vec<String>,

    /// Contact address used for every issuance
    #[serde(default)]
    pub contact: String,

    /// Certificates with fewer remaining days than this are renewed
    #[serde(default = "default_renew_days_before_expiration")]
    pub renew_days_before_expiration: i64,

    /// Location of the archived state tree
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Local workspace settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Object storage backend
    #[serde(default)]
    pub storage: ObjectStorageConfig,

    /// Certificate store backend
    #[serde(default)]
    pub store: CertificateStoreConfig,

    /// Certificate authority client
    #[serde(default)]
    pub authority: AuthorityConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl CertSyncConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            domains: Vec::new(),
            contact: String::new(),
            renew_days_before_expiration: default_renew_days_before_expiration(),
            snapshot: SnapshotConfig::default(),
            workspace: WorkspaceConfig::default(),
            storage: ObjectStorageConfig::default(),
            store: CertificateStoreConfig::default(),
            authority: AuthorityConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Set the managed domains from a comma-separated list
    pub fn with_domain_list(mut self, list: &str) -> Self {
        self.domains = parse_domain_list(list);
        self
    }

    /// Set the contact address
    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = contact.into();
        self
    }

    /// Set the renewal threshold in days
    pub fn with_renew_days(mut self, days: i64) -> Self {
        self.renew_days_before_expiration = days;
        self
    }

    /// Set the snapshot location
    pub fn with_snapshot(mut self, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        self.snapshot = SnapshotConfig {
            bucket: bucket.into(),
            key: key.into(),
        };
        self
    }

    /// Set the workspace root
    pub fn with_workspace(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace.root = root.into();
        self
    }

    /// Whether there is anything to do at all
    ///
    /// An empty domain list or an empty contact short-circuits the whole run.
    pub fn is_actionable(&self) -> bool {
        !self.domains.is_empty() && !self.contact.trim().is_empty()
    }

    /// Validate the configuration
    ///
    /// A configuration that is not actionable is always valid: the run
    /// reports a no-op without touching any collaborator.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.engine.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }

        if !self.is_actionable() {
            return Ok(());
        }

        if self.renew_days_before_expiration < 0 {
            return Err(crate::Error::config(format!(
                "Renewal threshold must be >= 0 days, got {}",
                self.renew_days_before_expiration
            )));
        }

        self.snapshot.validate()?;
        self.workspace.validate()?;
        self.storage.validate()?;
        self.store.validate()?;
        self.authority.validate()?;

        Ok(())
    }
}

impl Default for CertSyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a comma-separated domain list, trimming entries and dropping empty ones
///
/// Repeated entries are dropped, keeping the first occurrence in place. The
/// inventory is listed once per run, so a repeated domain would otherwise be
/// issued and imported twice.
pub fn parse_domain_list(list: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

/// Snapshot location in object storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Bucket holding the snapshot
    pub bucket: String,
    /// Object key of the snapshot
    #[serde(default = "default_snapshot_key")]
    pub key: String,
}

impl SnapshotConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.bucket.is_empty() {
            return Err(crate::Error::config("Snapshot bucket cannot be empty"));
        }
        if self.key.is_empty() {
            return Err(crate::Error::config("Snapshot object key cannot be empty"));
        }
        Ok(())
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            key: default_snapshot_key(),
        }
    }
}

/// Local workspace configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root of the authority client's config/work/logs directories
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
}

impl WorkspaceConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.root.as_os_str().is_empty() {
            return Err(crate::Error::config("Workspace root cannot be empty"));
        }
        if self.root.parent().is_none() {
            return Err(crate::Error::config(
                "Workspace root cannot be the filesystem root (it is removed after each run)",
            ));
        }
        Ok(())
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
        }
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStorageConfig {
    /// Directory-backed storage: one subdirectory per bucket
    File {
        /// Directory containing the bucket directories
        root: PathBuf,
    },

    /// In-memory storage (not persistent)
    Memory,

    /// HTTP, path-style S3-compatible storage
    Http {
        /// Endpoint base URL
        endpoint: String,
        /// Optional bearer token
        token: Option<String>,
    },

    /// Custom storage
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ObjectStorageConfig {
    /// Validate the storage configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ObjectStorageConfig::File { root } => {
                if root.as_os_str().is_empty() {
                    return Err(crate::Error::config("File storage root cannot be empty"));
                }
                Ok(())
            }
            ObjectStorageConfig::Http { endpoint, .. } => {
                if endpoint.is_empty() {
                    return Err(crate::Error::config("HTTP storage endpoint cannot be empty"));
                }
                if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
                    return Err(crate::Error::config(format!(
                        "HTTP storage endpoint must use HTTP or HTTPS scheme. Got: {}",
                        endpoint
                    )));
                }
                Ok(())
            }
            ObjectStorageConfig::Custom { factory, config } => {
                validate_custom("storage", factory, config)
            }
            ObjectStorageConfig::Memory => Ok(()),
        }
    }

    /// Get the storage type name
    pub fn type_name(&self) -> &str {
        match self {
            ObjectStorageConfig::File { .. } => "file",
            ObjectStorageConfig::Memory => "memory",
            ObjectStorageConfig::Http { .. } => "http",
            ObjectStorageConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        ObjectStorageConfig::File {
            root: PathBuf::from("/var/lib/certsync/buckets"),
        }
    }
}

/// Certificate store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CertificateStoreConfig {
    /// JSON inventory file
    File {
        /// Path to the inventory file
        path: PathBuf,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// Custom store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl CertificateStoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            CertificateStoreConfig::File { path } => {
                if path.as_os_str().is_empty() {
                    return Err(crate::Error::config("Certificate store path cannot be empty"));
                }
                Ok(())
            }
            CertificateStoreConfig::Custom { factory, config } => {
                validate_custom("certificate store", factory, config)
            }
            CertificateStoreConfig::Memory => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            CertificateStoreConfig::File { .. } => "file",
            CertificateStoreConfig::Memory => "memory",
            CertificateStoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Certificate authority client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthorityConfig {
    /// certbot executable
    Certbot {
        /// Path or name of the certbot binary
        #[serde(default = "default_certbot_binary")]
        binary: PathBuf,
        /// ACME directory URL
        #[serde(default = "default_server")]
        server: String,
        /// Command run by certbot to publish a challenge token
        #[serde(default = "default_auth_hook")]
        auth_hook: String,
        /// Command run by certbot to remove a challenge token
        #[serde(default = "default_cleanup_hook")]
        cleanup_hook: String,
    },

    /// Custom client
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl AuthorityConfig {
    /// Validate the authority configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            AuthorityConfig::Certbot {
                binary,
                server,
                auth_hook,
                cleanup_hook,
            } => {
                if binary.as_os_str().is_empty() {
                    return Err(crate::Error::config("certbot binary cannot be empty"));
                }
                if !server.starts_with("https://") {
                    return Err(crate::Error::config(format!(
                        "ACME server must be an HTTPS URL. Got: {}",
                        server
                    )));
                }
                if auth_hook.trim().is_empty() || cleanup_hook.trim().is_empty() {
                    return Err(crate::Error::config(
                        "certbot auth and cleanup hooks cannot be empty",
                    ));
                }
                Ok(())
            }
            AuthorityConfig::Custom { factory, config } => {
                validate_custom("authority", factory, config)
            }
        }
    }

    /// Get the authority type name
    pub fn type_name(&self) -> &str {
        match self {
            AuthorityConfig::Certbot { .. } => "certbot",
            AuthorityConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        AuthorityConfig::Certbot {
            binary: default_certbot_binary(),
            server: default_server(),
            auth_hook: default_auth_hook(),
            cleanup_hook: default_cleanup_hook(),
        }
    }
}

fn validate_custom(
    kind: &str,
    factory: &str,
    config: &serde_json::Value,
) -> Result<(), crate::Error> {
    if factory.is_empty() {
        return Err(crate::Error::config(format!(
            "Custom {} factory cannot be empty",
            kind
        )));
    }
    if config.is_null() {
        return Err(crate::Error::config(format!(
            "Custom {} config cannot be null",
            kind
        )));
    }
    Ok(())
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_renew_days_before_expiration() -> i64 {
    30
}

fn default_snapshot_key() -> String {
    "certbot.tar.gz".to_string()
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("/tmp/certbot")
}

fn default_certbot_binary() -> PathBuf {
    PathBuf::from("certbot")
}

fn default_server() -> String {
    LETS_ENCRYPT_STAGING.to_string()
}

fn default_auth_hook() -> String {
    "certsync-hook auth".to_string()
}

fn default_cleanup_hook() -> String {
    "certsync-hook cleanup".to_string()
}

fn default_event_channel_capacity() -> usize {
    256
}
