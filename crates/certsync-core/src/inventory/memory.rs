// # Memory Certificate Store
//
// In-memory implementation of CertificateStore.
//
// ## Purpose
//
// Provides a non-persistent inventory. Every run against a fresh memory
// store sees an empty inventory, so every domain with a cached local
// certificate is imported again. Useful for testing and dry runs.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{CertificateRecord, apply_import, find_detail, summaries};
use crate::Error;
use crate::config::CertificateStoreConfig;
use crate::traits::{
    CertificateDetail, CertificateMaterial, CertificateStore, CertificateStoreFactory,
    CertificateSummary,
};

/// In-memory certificate store
///
/// Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryCertificateStore {
    inner: Arc<RwLock<Vec<CertificateRecord>>>,
}

impl MemoryCertificateStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Snapshot of the stored records
    pub async fn records(&self) -> Vec<CertificateRecord> {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl CertificateStore for MemoryCertificateStore {
    async fn list(&self) -> Result<Vec<CertificateSummary>, Error> {
        Ok(summaries(&self.inner.read().await))
    }

    async fn describe(&self, id: &str) -> Result<CertificateDetail, Error> {
        find_detail(&self.inner.read().await, id)
    }

    async fn import(
        &self,
        material: CertificateMaterial,
        existing_id: Option<&str>,
    ) -> Result<String, Error> {
        let mut guard = self.inner.write().await;
        apply_import(&mut guard, material, existing_id)
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for in-memory certificate stores
pub struct MemoryCertificateStoreFactory;

#[async_trait]
impl CertificateStoreFactory for MemoryCertificateStoreFactory {
    async fn create(
        &self,
        config: &CertificateStoreConfig,
    ) -> Result<Box<dyn CertificateStore>, Error> {
        match config {
            CertificateStoreConfig::Memory => Ok(Box::new(MemoryCertificateStore::new())),
            _ => Err(Error::config("Invalid config for memory certificate store")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(domain: &str) -> CertificateMaterial {
        use rcgen::{CertificateParams, KeyPair};

        let key_pair = KeyPair::generate().unwrap();
        let params = CertificateParams::new(vec![domain.to_string()]).unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        CertificateMaterial {
            certificate: cert.pem().into_bytes(),
            private_key: key_pair.serialize_pem().into_bytes(),
            chain: cert.pem().into_bytes(),
        }
    }

    #[tokio::test]
    async fn test_import_create_then_replace() {
        let store = MemoryCertificateStore::new();
        assert!(store.is_empty().await);

        let id = store.import(material("example.com"), None).await.unwrap();
        assert!(id.starts_with("arn:certsync:certificate/"));

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].domain_name, "example.com");
        assert!(listed[0].not_after.is_some());

        let replaced = store
            .import(material("example.com"), Some(&id))
            .await
            .unwrap();
        assert_eq!(replaced, id);
        assert_eq!(store.len().await, 1);

        let detail = store.describe(&id).await.unwrap();
        assert_eq!(detail.domain_name, "example.com");
    }

    #[tokio::test]
    async fn test_import_unknown_id_is_not_found() {
        let store = MemoryCertificateStore::new();
        let err = store
            .import(material("example.com"), Some("arn:missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_import_rejects_malformed_material() {
        let store = MemoryCertificateStore::new();

        let mut bad_cert = material("example.com");
        bad_cert.certificate = b"garbage".to_vec();
        assert!(store.import(bad_cert, None).await.is_err());

        let mut bad_key = material("example.com");
        bad_key.private_key = b"garbage".to_vec();
        assert!(store.import(bad_key, None).await.is_err());

        let mut no_chain = material("example.com");
        no_chain.chain.clear();
        assert!(store.import(no_chain, None).await.is_err());

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_describe_unknown_id() {
        let store = MemoryCertificateStore::new();
        assert!(store.describe("arn:missing").await.unwrap_err().is_not_found());
    }
}
