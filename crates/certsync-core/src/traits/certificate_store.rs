// # Certificate Store Trait
//
// Defines the interface to the certificate-manager collaborator that holds
// the certificates consumed by downstream services (load balancers, CDNs).
//
// ## Purpose
//
// The engine only ever:
// - Lists the inventory once per run
// - Describes a record to learn its expiration
// - Imports material, either as a new record or replacing an existing one
//   by identifier so downstream bindings stay intact
//
// ## Implementations
//
// - In-memory: `inventory::MemoryCertificateStore`
// - JSON file: `inventory::FileCertificateStore`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the certificate inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSummary {
    /// Store identifier (ARN)
    pub id: String,
    /// Primary domain name of the certificate
    pub domain_name: String,
    /// Expiration, when the listing carries it
    #[serde(default)]
    pub not_after: Option<DateTime<Utc>>,
}

/// Detailed view of a single certificate record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDetail {
    /// Store identifier (ARN)
    pub id: String,
    /// Primary domain name of the certificate
    pub domain_name: String,
    /// Expiration timestamp
    pub not_after: DateTime<Utc>,
}

/// PEM material read from the local authority tree
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateMaterial {
    /// Leaf certificate (`cert.pem`)
    pub certificate: Vec<u8>,
    /// Private key (`privkey.pem`)
    pub private_key: Vec<u8>,
    /// Intermediate chain (`chain.pem`)
    pub chain: Vec<u8>,
}

// Key bytes never reach logs
impl std::fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("certificate", &format_args!("{} bytes", self.certificate.len()))
            .field("private_key", &"<REDACTED>")
            .field("chain", &format_args!("{} bytes", self.chain.len()))
            .finish()
    }
}

/// The inventory as listed once at the start of a run
///
/// The snapshot is treated as valid for the whole run; it is never
/// re-fetched per domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateInventory {
    entries: Vec<CertificateSummary>,
}

impl CertificateInventory {
    /// Wrap a listing
    pub fn new(entries: Vec<CertificateSummary>) -> Self {
        Self { entries }
    }

    /// First inventory entry whose domain name matches exactly
    pub fn lookup(&self, domain: &str) -> Option<&CertificateSummary> {
        self.entries.iter().find(|c| c.domain_name == domain)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the inventory is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Trait for certificate store implementations
///
/// # Import Semantics
///
/// - `import(material, None)` creates a new record and returns its id
/// - `import(material, Some(id))` replaces the record in place and returns
///   the same id; an unknown id is `Error::NotFound`
///
/// Malformed material is rejected with an error. The engine never swallows
/// import failures: a certificate issued but not imported stays in the
/// local tree and is picked up by the next run.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// List every certificate known to the store
    async fn list(&self) -> Result<Vec<CertificateSummary>, crate::Error>;

    /// Describe a single certificate by identifier
    async fn describe(&self, id: &str) -> Result<CertificateDetail, crate::Error>;

    /// Import certificate material, optionally replacing `existing_id`
    async fn import(
        &self,
        material: CertificateMaterial,
        existing_id: Option<&str>,
    ) -> Result<String, crate::Error>;

    /// Get the store name (for logging/debugging)
    fn store_name(&self) -> &'static str;
}

/// Helper trait for constructing certificate stores from configuration
///
/// Creation is async because persistent stores load their inventory first.
#[async_trait]
pub trait CertificateStoreFactory: Send + Sync {
    /// Create a CertificateStore instance from configuration
    async fn create(
        &self,
        config: &crate::config::CertificateStoreConfig,
    ) -> Result<Box<dyn CertificateStore>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, domain: &str) -> CertificateSummary {
        CertificateSummary {
            id: id.to_string(),
            domain_name: domain.to_string(),
            not_after: None,
        }
    }

    #[test]
    fn test_inventory_lookup_takes_first_match() {
        let inventory = CertificateInventory::new(vec![
            summary("arn:1", "a.com"),
            summary("arn:2", "b.com"),
            summary("arn:3", "a.com"),
        ]);

        assert_eq!(inventory.lookup("a.com").map(|c| c.id.as_str()), Some("arn:1"));
        assert_eq!(inventory.lookup("b.com").map(|c| c.id.as_str()), Some("arn:2"));
        assert!(inventory.lookup("c.com").is_none());
        assert!(inventory.lookup("www.a.com").is_none());
    }

    #[test]
    fn test_material_debug_hides_key() {
        let material = CertificateMaterial {
            certificate: b"cert".to_vec(),
            private_key: b"super-secret-key".to_vec(),
            chain: b"chain".to_vec(),
        };

        let debug_str = format!("{:?}", material);
        assert!(!debug_str.contains("super-secret-key"));
        assert!(debug_str.contains("<REDACTED>"));
    }
}
