// # Certificate Authority Trait
//
// Defines the interface to the external ACME client that performs the
// actual protocol exchange (account registration, HTTP-01 challenge,
// order finalization, key and certificate generation).
//
// ## Contract
//
// The client works on disk. Both operations leave their output in the
// local authority tree rooted at `AuthorityDirs::config`:
//
// - `archive/<domain>/{cert,chain,privkey,fullchain}N.pem`
// - `live/<domain>/*.pem` symlinks to the newest `N`
// - `renewal/<domain>.conf`, `accounts/...`
//
// ## Implementations
//
// - certbot process: `certsync-certbot` crate

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Working directory roots handed to the authority client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityDirs {
    /// Configuration tree (live/archive/renewal/accounts)
    pub config: PathBuf,
    /// Scratch directory
    pub work: PathBuf,
    /// Log directory
    pub logs: PathBuf,
}

impl AuthorityDirs {
    /// Standard layout under a workspace root
    pub fn under(root: &Path) -> Self {
        Self {
            config: root.join("config"),
            work: root.join("work"),
            logs: root.join("logs"),
        }
    }
}

/// A fresh issuance request
#[derive(Debug, Clone, Copy)]
pub struct IssueRequest<'a> {
    /// Domain to validate and issue for
    pub domain: &'a str,
    /// Contact address registered with the authority
    pub contact: &'a str,
    /// Working directories
    pub dirs: &'a AuthorityDirs,
}

/// Trait for certificate authority client implementations
///
/// # Error Contract
///
/// Any non-successful outcome of the client MUST be returned as an error
/// (`Error::Authority`). The engine aborts the current domain on error and
/// moves on to the next one.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Run a full issuance for `request.domain`
    ///
    /// Challenge publication happens through hooks configured on the
    /// client, not through the engine.
    async fn issue(&self, request: IssueRequest<'_>) -> Result<(), crate::Error>;

    /// Force renewal of the existing lineage for `domain`
    ///
    /// The caller guarantees the live links point at the newest archive
    /// version before this is called.
    async fn renew(&self, domain: &str, dirs: &AuthorityDirs) -> Result<(), crate::Error>;

    /// Get the client name (for logging/debugging)
    fn authority_name(&self) -> &'static str;
}

/// Helper trait for constructing authority clients from configuration
pub trait CertificateAuthorityFactory: Send + Sync {
    /// Create a CertificateAuthority instance from configuration
    fn create(
        &self,
        config: &crate::config::AuthorityConfig,
    ) -> Result<Box<dyn CertificateAuthority>, crate::Error>;
}
