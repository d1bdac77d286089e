// # certsyncd support library
//
// Environment loading and collaborator wiring shared by the `certsyncd`
// runner and the `certsync-hook` challenge hook.
//
// All configuration is done via environment variables; nothing here holds
// lifecycle logic, which lives in certsync-core.

use anyhow::{Context, Result};
use certsync_core::config::{
    AuthorityConfig, CertSyncConfig, CertificateStoreConfig, EngineConfig, ObjectStorageConfig,
    SnapshotConfig, WorkspaceConfig, parse_domain_list,
};
use certsync_core::CollaboratorRegistry;
use std::path::{Path, PathBuf};
use tracing::{Level, warn};
use tracing_subscriber::FmtSubscriber;

/// Default inventory path of the file certificate store
const DEFAULT_STORE_PATH: &str = "/var/lib/certsync/certificates.json";

/// Default root of the file object storage
const DEFAULT_STORAGE_ROOT: &str = "/var/lib/certsync/buckets";

/// Exit codes for different termination scenarios
///
/// - 0: Run completed (per-domain failures are reported in the result)
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertsyncExitCode {
    /// Run completed
    Completed = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<CertsyncExitCode> for std::process::ExitCode {
    fn from(code: CertsyncExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

/// Object storage settings, needed by both binaries
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub storage_type: String,
    pub root: Option<String>,
    pub endpoint: Option<String>,
    token: Option<String>,
}

impl StorageSettings {
    /// Load from a variable lookup
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            storage_type: lookup("CERTSYNC_STORAGE_TYPE").unwrap_or_else(|| "file".to_string()),
            root: lookup("CERTSYNC_STORAGE_ROOT"),
            endpoint: lookup("CERTSYNC_STORAGE_ENDPOINT"),
            token: lookup("CERTSYNC_STORAGE_TOKEN"),
        }
    }

    /// Validate the storage selection
    pub fn validate(&self) -> Result<()> {
        match self.storage_type.as_str() {
            "file" => {
                if self.root.as_ref().is_some_and(|r| r.is_empty()) {
                    anyhow::bail!("CERTSYNC_STORAGE_ROOT cannot be empty when CERTSYNC_STORAGE_TYPE=file");
                }
            }
            "memory" => {}
            "http" => {
                let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.is_empty()) else {
                    anyhow::bail!(
                        "CERTSYNC_STORAGE_ENDPOINT is required when CERTSYNC_STORAGE_TYPE=http"
                    );
                };
                if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
                    anyhow::bail!(
                        "CERTSYNC_STORAGE_ENDPOINT must use HTTP or HTTPS scheme. Got: {}",
                        endpoint
                    );
                }
                if endpoint.starts_with("http://") {
                    eprintln!(
                        "WARNING: CERTSYNC_STORAGE_ENDPOINT uses HTTP (not HTTPS). \
                        Snapshots contain private keys; consider using HTTPS."
                    );
                }
            }
            other => anyhow::bail!(
                "CERTSYNC_STORAGE_TYPE '{}' is not supported. \
                Supported types: file, memory, http",
                other
            ),
        }
        Ok(())
    }

    /// Core configuration for the selected backend
    pub fn to_config(&self) -> ObjectStorageConfig {
        match self.storage_type.as_str() {
            "memory" => ObjectStorageConfig::Memory,
            "http" => ObjectStorageConfig::Http {
                endpoint: self.endpoint.clone().unwrap_or_default(),
                token: self.token.clone(),
            },
            _ => ObjectStorageConfig::File {
                root: PathBuf::from(self.root.as_deref().unwrap_or(DEFAULT_STORAGE_ROOT)),
            },
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub domains: Vec<String>,
    pub contact: String,
    /// Raw `CERTS_RENEW_DAYS_BEFORE_EXPIRATION`, parsed by [`Settings::renew_days`]
    pub renew_days_raw: Option<String>,
    pub snapshot_bucket: String,
    pub snapshot_key: String,
    pub workspace: PathBuf,
    pub log_level: String,
    pub storage: StorageSettings,
    pub store_type: String,
    pub store_path: Option<String>,
    pub certbot_binary: String,
    pub certbot_server: String,
    pub auth_hook: String,
    pub cleanup_hook: String,
}

impl Settings {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = CertSyncConfig::default();
        let AuthorityConfig::Certbot {
            binary,
            server,
            auth_hook,
            cleanup_hook,
        } = AuthorityConfig::default()
        else {
            anyhow::bail!("default authority is not certbot");
        };

        Ok(Self {
            domains: parse_domain_list(&lookup("DOMAINS_LIST").unwrap_or_default()),
            contact: lookup("DOMAINS_EMAIL").unwrap_or_default().trim().to_string(),
            renew_days_raw: lookup("CERTS_RENEW_DAYS_BEFORE_EXPIRATION"),
            snapshot_bucket: lookup("CERTBOT_BUCKET").unwrap_or_default(),
            snapshot_key: lookup("CERTBOT_OBJECT").unwrap_or(defaults.snapshot.key),
            workspace: lookup("CERTSYNC_WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace.root),
            log_level: lookup("CERTSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            storage: StorageSettings::from_lookup(lookup),
            store_type: lookup("CERTSYNC_STORE_TYPE").unwrap_or_else(|| "file".to_string()),
            store_path: lookup("CERTSYNC_STORE_PATH"),
            certbot_binary: lookup("CERTBOT_BINARY")
                .unwrap_or_else(|| binary.to_string_lossy().into_owned()),
            certbot_server: lookup("CERTBOT_SERVER").unwrap_or(server),
            auth_hook: lookup("CERTSYNC_AUTH_HOOK").unwrap_or(auth_hook),
            cleanup_hook: lookup("CERTSYNC_CLEANUP_HOOK").unwrap_or(cleanup_hook),
        })
    }

    /// Renewal threshold in days
    ///
    /// Only parsed for actionable runs, so a stray value never turns the
    /// no-op into a configuration error.
    pub fn renew_days(&self) -> Result<i64> {
        match &self.renew_days_raw {
            Some(raw) => raw.trim().parse().with_context(|| {
                format!("CERTS_RENEW_DAYS_BEFORE_EXPIRATION must be an integer. Got: {}", raw)
            }),
            None => Ok(CertSyncConfig::default().renew_days_before_expiration),
        }
    }

    /// Whether there is anything to do
    pub fn is_actionable(&self) -> bool {
        !self.domains.is_empty() && !self.contact.is_empty()
    }

    /// Validate the configuration
    ///
    /// The log level is always checked. Everything else is only checked when
    /// the run is actionable: an empty domain list or contact is a no-op,
    /// not an error.
    pub fn validate(&self) -> Result<()> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "CERTSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        if !self.is_actionable() {
            return Ok(());
        }

        for domain in &self.domains {
            validate_domain_name(domain)?;
        }

        if !self.contact.contains('@') {
            anyhow::bail!("DOMAINS_EMAIL does not look like an email address: {}", self.contact);
        }

        let renew_days = self.renew_days()?;
        if renew_days < 0 {
            anyhow::bail!(
                "CERTS_RENEW_DAYS_BEFORE_EXPIRATION must be >= 0. Got: {}",
                renew_days
            );
        }

        if self.snapshot_bucket.is_empty() {
            anyhow::bail!(
                "CERTBOT_BUCKET is required. \
                Set it via: export CERTBOT_BUCKET=my-certbot-state"
            );
        }

        self.storage.validate()?;

        match self.store_type.as_str() {
            "file" => {
                let path = self.store_path.as_deref().unwrap_or(DEFAULT_STORE_PATH);
                if path.is_empty() {
                    anyhow::bail!(
                        "CERTSYNC_STORE_PATH cannot be empty when CERTSYNC_STORE_TYPE=file"
                    );
                }

                if let Some(parent) = Path::new(path).parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                {
                    anyhow::bail!(
                        "CERTSYNC_STORE_PATH parent directory does not exist: {}. \
                        Create it first: sudo mkdir -p {}",
                        parent.display(),
                        parent.display()
                    );
                }
            }
            "memory" => {}
            other => anyhow::bail!(
                "CERTSYNC_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        }

        if !self.certbot_server.starts_with("https://") {
            anyhow::bail!("CERTBOT_SERVER must be an HTTPS URL. Got: {}", self.certbot_server);
        }

        Ok(())
    }

    /// Build the core configuration
    pub fn to_config(&self) -> Result<CertSyncConfig> {
        let store = match self.store_type.as_str() {
            "memory" => CertificateStoreConfig::Memory,
            _ => CertificateStoreConfig::File {
                path: PathBuf::from(self.store_path.as_deref().unwrap_or(DEFAULT_STORE_PATH)),
            },
        };

        Ok(CertSyncConfig {
            domains: self.domains.clone(),
            contact: self.contact.clone(),
            renew_days_before_expiration: self.renew_days()?,
            snapshot: SnapshotConfig {
                bucket: self.snapshot_bucket.clone(),
                key: self.snapshot_key.clone(),
            },
            workspace: WorkspaceConfig {
                root: self.workspace.clone(),
            },
            storage: self.storage.to_config(),
            store,
            authority: AuthorityConfig::Certbot {
                binary: PathBuf::from(&self.certbot_binary),
                server: self.certbot_server.clone(),
                auth_hook: self.auth_hook.clone(),
                cleanup_hook: self.cleanup_hook.clone(),
            },
            engine: EngineConfig::default(),
        })
    }
}

/// Validate that a string is a valid domain name
///
/// This implements basic DNS domain name validation per RFC 1035.
/// It's not comprehensive but catches common errors.
pub fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        anyhow::bail!("Domain name cannot be empty");
    }

    // Total length limit (RFC 1035: 253 chars max)
    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric and hyphen only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}

/// Wait for the event logger task, reporting whether it ended cleanly
///
/// A panicked or cancelled logger never fails the run; it is logged.
pub async fn join_event_logger(handle: tokio::task::JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!("Event logger task failed: {}", e);
            false
        }
    }
}

/// Install the stderr subscriber; stdout is reserved for results
pub fn init_tracing(level: &str) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

/// Registry with every backend this binary ships
pub fn build_registry() -> CollaboratorRegistry {
    let registry = CollaboratorRegistry::new();
    certsync_core::register_builtin(&registry);
    certsync_storage_http::register(&registry);
    certsync_certbot::register(&registry);
    registry
}
