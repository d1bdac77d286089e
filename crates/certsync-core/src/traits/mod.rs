//! Core traits for the certsync system
//!
//! This module defines the abstract interfaces to the external collaborators.
//!
//! - [`ObjectStorage`]: Snapshot and challenge object storage
//! - [`CertificateStore`]: Certificate inventory (list/describe/import)
//! - [`CertificateAuthority`]: External ACME client (issue/renew)

pub mod authority;
pub mod certificate_store;
pub mod object_storage;

pub use authority::{AuthorityDirs, CertificateAuthority, CertificateAuthorityFactory, IssueRequest};
pub use certificate_store::{
    CertificateDetail, CertificateInventory, CertificateMaterial, CertificateStore,
    CertificateStoreFactory, CertificateSummary,
};
pub use object_storage::{ObjectStorage, ObjectStorageFactory};
