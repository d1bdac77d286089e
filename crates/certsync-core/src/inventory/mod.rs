// # Certificate Store Implementations
//
// This module provides local implementations of the CertificateStore trait.
// Both keep an ordered list of records; listing preserves import order so
// that "first record for a domain" is stable across runs.

pub mod file;
pub mod memory;
pub mod x509;

pub use file::{FileCertificateStore, FileCertificateStoreFactory};
pub use memory::{MemoryCertificateStore, MemoryCertificateStoreFactory};
pub use x509::{CertificateFacts, inspect_certificate};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::traits::{CertificateDetail, CertificateMaterial, CertificateSummary};

/// Identifier prefix for locally issued store ids
const ID_PREFIX: &str = "arn:certsync:certificate/";

/// A certificate as held by a local store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Store identifier
    pub id: String,
    /// Primary domain name derived from the certificate
    pub domain_name: String,
    /// Expiration derived from the certificate
    pub not_after: DateTime<Utc>,
    /// When the material was last imported
    pub imported_at: DateTime<Utc>,
    /// Leaf certificate PEM
    pub certificate: String,
    /// Private key PEM
    pub private_key: String,
    /// Chain PEM
    pub chain: String,
}

impl CertificateRecord {
    fn summary(&self) -> CertificateSummary {
        CertificateSummary {
            id: self.id.clone(),
            domain_name: self.domain_name.clone(),
            not_after: Some(self.not_after),
        }
    }

    fn detail(&self) -> CertificateDetail {
        CertificateDetail {
            id: self.id.clone(),
            domain_name: self.domain_name.clone(),
            not_after: self.not_after,
        }
    }
}

fn pem_text(bytes: Vec<u8>, what: &str) -> Result<String, Error> {
    String::from_utf8(bytes).map_err(|_| Error::invalid_input(format!("{} is not valid UTF-8 PEM", what)))
}

/// Validate material and apply an import to an ordered record list
///
/// Returns the id of the created or replaced record.
pub(crate) fn apply_import(
    records: &mut Vec<CertificateRecord>,
    material: CertificateMaterial,
    existing_id: Option<&str>,
) -> Result<String, Error> {
    let facts = inspect_certificate(&material.certificate)?;

    if !x509::looks_like_private_key(&material.private_key) {
        return Err(Error::invalid_input("Private key is not a PEM private key"));
    }
    if material.chain.is_empty() {
        return Err(Error::invalid_input("Certificate chain is empty"));
    }

    let id = match existing_id {
        Some(id) => {
            if !records.iter().any(|r| r.id == id) {
                return Err(Error::not_found(format!("certificate {}", id)));
            }
            id.to_string()
        }
        None => format!("{}{}", ID_PREFIX, uuid::Uuid::new_v4()),
    };

    let record = CertificateRecord {
        id: id.clone(),
        domain_name: facts.domain_name,
        not_after: facts.not_after,
        imported_at: Utc::now(),
        certificate: pem_text(material.certificate, "Certificate")?,
        private_key: pem_text(material.private_key, "Private key")?,
        chain: pem_text(material.chain, "Chain")?,
    };

    match records.iter_mut().find(|r| r.id == id) {
        Some(slot) => *slot = record,
        None => records.push(record),
    }

    Ok(id)
}

pub(crate) fn find_detail(
    records: &[CertificateRecord],
    id: &str,
) -> Result<CertificateDetail, Error> {
    records
        .iter()
        .find(|r| r.id == id)
        .map(CertificateRecord::detail)
        .ok_or_else(|| Error::not_found(format!("certificate {}", id)))
}

pub(crate) fn summaries(records: &[CertificateRecord]) -> Vec<CertificateSummary> {
    records.iter().map(CertificateRecord::summary).collect()
}
