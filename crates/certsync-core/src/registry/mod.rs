//! Plugin-based collaborator registry
//!
//! The registry allows object storages, certificate stores and authority
//! clients to be registered dynamically at runtime, avoiding hardcoded
//! if-else chains in the binaries.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use certsync_core::registry::CollaboratorRegistry;
//!
//! let registry = CollaboratorRegistry::new();
//! certsync_core::register_builtin(&registry);
//! certsync_storage_http::register(&registry);
//! certsync_certbot::register(&registry);
//!
//! let storage = registry.create_object_storage(&config.storage)?;
//! let store = registry.create_certificate_store(&config.store).await?;
//! let authority = registry.create_authority(&config.authority)?;
//! ```
//!
//! ## Registration
//!
//! Implementations should register themselves during initialization:
//!
//! ```rust,ignore
//! // In certsync-certbot crate
//! pub fn register(registry: &CollaboratorRegistry) {
//!     registry.register_authority("certbot", Box::new(CertbotFactory));
//! }
//! ```

use crate::config::{AuthorityConfig, CertificateStoreConfig, ObjectStorageConfig};
use crate::error::{Error, Result};
use crate::inventory::{FileCertificateStoreFactory, MemoryCertificateStoreFactory};
use crate::storage::{FileObjectStorageFactory, MemoryObjectStorageFactory};
use crate::traits::{CertificateAuthority, CertificateStore, ObjectStorage};
use crate::traits::{CertificateAuthorityFactory, CertificateStoreFactory, ObjectStorageFactory};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Factories<F> = RwLock<HashMap<String, F>>;

/// Collaborator registry for plugin-based construction
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes. A poisoned lock is recovered; the maps are
/// only ever inserted into.
#[derive(Default)]
pub struct CollaboratorRegistry {
    /// Registered object storage factories
    storages: Factories<Box<dyn ObjectStorageFactory>>,

    /// Registered certificate store factories
    stores: Factories<Arc<dyn CertificateStoreFactory>>,

    /// Registered authority factories
    authorities: Factories<Box<dyn CertificateAuthorityFactory>>,
}

fn read<F>(lock: &Factories<F>) -> RwLockReadGuard<'_, HashMap<String, F>> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<F>(lock: &Factories<F>) -> RwLockWriteGuard<'_, HashMap<String, F>> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CollaboratorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object storage factory
    ///
    /// # Parameters
    ///
    /// - `name`: storage type name (e.g., "file", "http")
    /// - `factory`: factory object for creating storage instances
    pub fn register_object_storage(
        &self,
        name: impl Into<String>,
        factory: Box<dyn ObjectStorageFactory>,
    ) {
        write(&self.storages).insert(name.into(), factory);
    }

    /// Register a certificate store factory
    pub fn register_certificate_store(
        &self,
        name: impl Into<String>,
        factory: Box<dyn CertificateStoreFactory>,
    ) {
        write(&self.stores).insert(name.into(), Arc::from(factory));
    }

    /// Register an authority client factory
    pub fn register_authority(
        &self,
        name: impl Into<String>,
        factory: Box<dyn CertificateAuthorityFactory>,
    ) {
        write(&self.authorities).insert(name.into(), factory);
    }

    /// Create an object storage from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn ObjectStorage>)`: shared between the probe, the
    ///   challenge hook and the synchronizer
    /// - `Err(Error)`: if the type is not registered or creation fails
    pub fn create_object_storage(
        &self,
        config: &ObjectStorageConfig,
    ) -> Result<Arc<dyn ObjectStorage>> {
        let storage_type = config.type_name();
        let storages = read(&self.storages);

        let factory = storages.get(storage_type).ok_or_else(|| {
            Error::config(format!("Unknown object storage type: {}", storage_type))
        })?;

        factory.create(config).map(Arc::from)
    }

    /// Create a certificate store from configuration
    pub async fn create_certificate_store(
        &self,
        config: &CertificateStoreConfig,
    ) -> Result<Box<dyn CertificateStore>> {
        let store_type = config.type_name();

        let factory = read(&self.stores)
            .get(store_type)
            .ok_or_else(|| Error::config(format!("Unknown certificate store type: {}", store_type)))?
            .clone();

        // Lock is released before the async create
        factory.create(config).await
    }

    /// Create an authority client from configuration
    pub fn create_authority(&self, config: &AuthorityConfig) -> Result<Box<dyn CertificateAuthority>> {
        let authority_type = config.type_name();
        let authorities = read(&self.authorities);

        let factory = authorities.get(authority_type).ok_or_else(|| {
            Error::config(format!("Unknown authority type: {}", authority_type))
        })?;

        factory.create(config)
    }

    /// List all registered object storage types
    pub fn list_object_storages(&self) -> Vec<String> {
        read(&self.storages).keys().cloned().collect()
    }

    /// List all registered certificate store types
    pub fn list_certificate_stores(&self) -> Vec<String> {
        read(&self.stores).keys().cloned().collect()
    }

    /// List all registered authority types
    pub fn list_authorities(&self) -> Vec<String> {
        read(&self.authorities).keys().cloned().collect()
    }

    /// Check if an object storage type is registered
    pub fn has_object_storage(&self, name: &str) -> bool {
        read(&self.storages).contains_key(name)
    }

    /// Check if a certificate store type is registered
    pub fn has_certificate_store(&self, name: &str) -> bool {
        read(&self.stores).contains_key(name)
    }

    /// Check if an authority type is registered
    pub fn has_authority(&self, name: &str) -> bool {
        read(&self.authorities).contains_key(name)
    }
}

/// Register the backends shipped with this crate
///
/// - object storage: `file`, `memory`
/// - certificate store: `file`, `memory`
pub fn register_builtin(registry: &CollaboratorRegistry) {
    registry.register_object_storage("file", Box::new(FileObjectStorageFactory));
    registry.register_object_storage("memory", Box::new(MemoryObjectStorageFactory));
    registry.register_certificate_store("file", Box::new(FileCertificateStoreFactory));
    registry.register_certificate_store("memory", Box::new(MemoryCertificateStoreFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockAuthorityFactory;

    impl CertificateAuthorityFactory for MockAuthorityFactory {
        fn create(&self, _config: &AuthorityConfig) -> Result<Box<dyn CertificateAuthority>> {
            Err(Error::not_found("Mock authority not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = CollaboratorRegistry::new();

        assert!(!registry.has_authority("certbot"));
        registry.register_authority("certbot", Box::new(MockAuthorityFactory));

        assert!(registry.has_authority("certbot"));
        assert!(registry.list_authorities().contains(&"certbot".to_string()));
        assert!(registry.create_authority(&AuthorityConfig::default()).is_err());
    }

    #[test]
    fn test_unknown_type_is_config_error() {
        let registry = CollaboratorRegistry::new();

        let err = registry
            .create_object_storage(&ObjectStorageConfig::Memory)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_builtin_backends() {
        let registry = CollaboratorRegistry::new();
        register_builtin(&registry);

        assert!(registry.has_object_storage("file"));
        assert!(registry.has_object_storage("memory"));
        assert!(!registry.has_object_storage("http"));

        let storage = registry
            .create_object_storage(&ObjectStorageConfig::Memory)
            .unwrap();
        assert_eq!(storage.storage_name(), "memory");

        let store = registry
            .create_certificate_store(&CertificateStoreConfig::Memory)
            .await
            .unwrap();
        assert_eq!(store.store_name(), "memory");
        assert!(store.list().await.unwrap().is_empty());
    }
}
