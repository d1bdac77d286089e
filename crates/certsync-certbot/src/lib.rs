// # certbot Authority Client
//
// This crate drives the `certbot` executable as the CertificateAuthority of
// the certificate lifecycle engine.
//
// ## Behavior
//
// - One certbot process per operation, awaited to completion
// - Directory roots always overridden (`--config-dir/--work-dir/--logs-dir`)
//   so nothing needs root and everything lands in the synchronized tree
// - HTTP-01 through manual hooks; the hooks publish the token into the
//   domain bucket (see the `certsync-hook` binary)
// - A non-zero exit is an `Error::Authority` carrying the tail of stderr
// - No retry logic: the engine aborts the domain and moves on

use async_trait::async_trait;
use certsync_core::config::AuthorityConfig;
use certsync_core::traits::{
    AuthorityDirs, CertificateAuthority, CertificateAuthorityFactory, IssueRequest,
};
use certsync_core::{CollaboratorRegistry, Error, Result};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Lines of stderr kept in error messages
const STDERR_TAIL_LINES: usize = 20;

/// certbot-backed authority client
#[derive(Debug, Clone)]
pub struct CertbotAuthority {
    /// certbot executable
    binary: PathBuf,

    /// ACME directory URL
    server: String,

    /// Command publishing a challenge token
    auth_hook: String,

    /// Command removing a challenge token
    cleanup_hook: String,
}

impl CertbotAuthority {
    /// Create a new client
    pub fn new(
        binary: impl Into<PathBuf>,
        server: impl Into<String>,
        auth_hook: impl Into<String>,
        cleanup_hook: impl Into<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            server: server.into(),
            auth_hook: auth_hook.into(),
            cleanup_hook: cleanup_hook.into(),
        }
    }

    /// Arguments for a fresh issuance
    pub fn issue_args(&self, request: &IssueRequest<'_>) -> Vec<OsString> {
        let mut args = dir_args(request.dirs);
        args.extend(
            [
                "certonly",
                "--manual",
                "--preferred-challenges",
                "http",
                "--manual-auth-hook",
                self.auth_hook.as_str(),
                "--manual-cleanup-hook",
                self.cleanup_hook.as_str(),
                "--domains",
                request.domain,
                "--non-interactive",
                "--agree-tos",
                "--email",
                request.contact,
                "--server",
                self.server.as_str(),
            ]
            .into_iter()
            .map(OsString::from),
        );
        args
    }

    /// Arguments for a forced renewal of one lineage
    pub fn renew_args(&self, domain: &str, dirs: &AuthorityDirs) -> Vec<OsString> {
        let mut args = dir_args(dirs);
        args.extend(
            [
                "renew",
                "--force-renewal",
                "--non-interactive",
                "--cert-name",
                domain,
            ]
            .into_iter()
            .map(OsString::from),
        );
        args
    }

    async fn execute(&self, action: &str, domain: &str, args: Vec<OsString>) -> Result<()> {
        debug!(domain = %domain, "Running {} {}", self.binary.display(), action);

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::authority(format!(
                    "Failed to execute {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::authority(format!(
                "certbot {} for {} failed ({}): {}",
                action,
                domain,
                output.status,
                tail(&stderr, STDERR_TAIL_LINES)
            )));
        }

        info!(domain = %domain, "certbot {} completed", action);
        Ok(())
    }
}

fn dir_args(dirs: &AuthorityDirs) -> Vec<OsString> {
    vec![
        "--config-dir".into(),
        dirs.config.clone().into_os_string(),
        "--work-dir".into(),
        dirs.work.clone().into_os_string(),
        "--logs-dir".into(),
        dirs.logs.clone().into_os_string(),
    ]
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[async_trait]
impl CertificateAuthority for CertbotAuthority {
    async fn issue(&self, request: IssueRequest<'_>) -> Result<()> {
        let args = self.issue_args(&request);
        self.execute("certonly", request.domain, args).await
    }

    async fn renew(&self, domain: &str, dirs: &AuthorityDirs) -> Result<()> {
        let args = self.renew_args(domain, dirs);
        self.execute("renew", domain, args).await
    }

    fn authority_name(&self) -> &'static str {
        "certbot"
    }
}

/// Factory for creating certbot clients
pub struct CertbotFactory;

impl CertificateAuthorityFactory for CertbotFactory {
    fn create(&self, config: &AuthorityConfig) -> Result<Box<dyn CertificateAuthority>> {
        match config {
            AuthorityConfig::Certbot {
                binary,
                server,
                auth_hook,
                cleanup_hook,
            } => {
                if binary.as_os_str().is_empty() {
                    return Err(Error::config("certbot binary is required"));
                }
                Ok(Box::new(CertbotAuthority::new(
                    binary.clone(),
                    server.clone(),
                    auth_hook.clone(),
                    cleanup_hook.clone(),
                )))
            }
            _ => Err(Error::config("Invalid config for certbot authority")),
        }
    }
}

/// Register the certbot client with a registry
///
/// # Example
///
/// ```rust
/// use certsync_core::CollaboratorRegistry;
///
/// let registry = CollaboratorRegistry::new();
/// certsync_certbot::register(&registry);
/// assert!(registry.has_authority("certbot"));
/// ```
pub fn register(registry: &CollaboratorRegistry) {
    registry.register_authority("certbot", Box::new(CertbotFactory));
}
