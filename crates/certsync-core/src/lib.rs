// # certsync-core
//
// Core library for the certificate lifecycle engine.
//
// ## Architecture Overview
//
// This library decides, per domain, whether a certificate must be issued,
// renewed, imported or left alone, and carries the authority client's
// working tree between invocations of an environment without a durable disk:
// - **ObjectStorage**: Trait for bucket/key storage (challenges, snapshot)
// - **CertificateStore**: Trait for the certificate inventory served downstream
// - **CertificateAuthority**: Trait for the ACME client working on disk
// - **PolicyValidator**: Probes challenge bucket permissions before issuance
// - **Synchronizer**: Restores and archives the authority tree
// - **CertSyncEngine**: Core engine applying the decision table
// - **CollaboratorRegistry**: Plugin-based registry for all three collaborators
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Explicit Collaborators**: Every external handle is passed into the engine
// 3. **Plugin-Based**: Backends are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Per-Domain Isolation**: One domain's failure never blocks the others

pub mod challenge;
pub mod config;
pub mod engine;
pub mod error;
pub mod expiry;
pub mod inventory;
pub mod policy;
pub mod registry;
pub mod storage;
pub mod sync;
pub mod traits;
pub mod tree;

// Re-export core types for convenience
pub use challenge::ChallengePublisher;
pub use config::{
    AuthorityConfig, CertSyncConfig, CertificateStoreConfig, ObjectStorageConfig, SnapshotConfig,
};
pub use engine::{CertSyncEngine, DomainOutcome, EngineEvent, RunCounters, RunReport, SkipReason};
pub use error::{Error, Result};
pub use inventory::{FileCertificateStore, MemoryCertificateStore};
pub use policy::PolicyValidator;
pub use registry::{CollaboratorRegistry, register_builtin};
pub use storage::{FileObjectStorage, MemoryObjectStorage};
pub use sync::{RestoreOutcome, Synchronizer};
pub use traits::{CertificateAuthority, CertificateStore, ObjectStorage};
pub use tree::StateTree;
