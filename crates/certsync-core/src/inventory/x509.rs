//! PEM certificate inspection
//!
//! Stores derive the record's domain name and expiration from the leaf
//! certificate itself rather than trusting caller-supplied values.

use chrono::{DateTime, Utc};
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::pem::parse_x509_pem;

use crate::Error;

/// Facts extracted from a leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFacts {
    /// First DNS subject alternative name, else the subject common name
    pub domain_name: String,
    /// End of the validity period
    pub not_after: DateTime<Utc>,
}

/// Parse the first PEM block of `pem` as an X.509 certificate
pub fn inspect_certificate(pem: &[u8]) -> Result<CertificateFacts, Error> {
    let (_, pem) = parse_x509_pem(pem)
        .map_err(|e| Error::invalid_input(format!("Failed to parse PEM certificate: {}", e)))?;

    let (_, cert) = x509_parser::parse_x509_certificate(&pem.contents)
        .map_err(|e| Error::invalid_input(format!("Failed to parse X.509 certificate: {}", e)))?;

    let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| Error::invalid_input("Certificate not_after is out of range"))?;

    let san_name = cert.extensions().iter().find_map(|ext| {
        if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
            san.general_names.iter().find_map(|name| match name {
                GeneralName::DNSName(dns) => Some(dns.to_string()),
                _ => None,
            })
        } else {
            None
        }
    });

    let domain_name = match san_name {
        Some(name) => name,
        None => cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::invalid_input("Certificate names no domain"))?,
    };

    Ok(CertificateFacts {
        domain_name,
        not_after,
    })
}

/// Whether `pem` looks like a PEM private key
pub fn looks_like_private_key(pem: &[u8]) -> bool {
    std::str::from_utf8(pem)
        .map(|s| s.contains("-----BEGIN") && s.contains("PRIVATE KEY-----"))
        .unwrap_or(false)
}
