//! Error types for the certsync system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for certsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the certsync system
#[derive(Error, Debug)]
pub enum Error {
    /// Object storage errors (snapshot bucket, challenge buckets)
    #[error("Object storage error: {0}")]
    ObjectStorage(String),

    /// Certificate store errors (list, describe, import)
    #[error("Certificate store error: {0}")]
    CertificateStore(String),

    /// Certificate authority client errors (issue, renew)
    #[error("Certificate authority error: {0}")]
    Authority(String),

    /// Local authority state tree errors
    #[error("State tree error: {0}")]
    StateTree(String),

    /// Snapshot packing/unpacking errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Object or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Access denied by a collaborator
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backend-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Backend name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an object storage error
    pub fn object_storage(msg: impl Into<String>) -> Self {
        Self::ObjectStorage(msg.into())
    }

    /// Create a certificate store error
    pub fn certificate_store(msg: impl Into<String>) -> Self {
        Self::CertificateStore(msg.into())
    }

    /// Create a certificate authority error
    pub fn authority(msg: impl Into<String>) -> Self {
        Self::Authority(msg.into())
    }

    /// Create a state tree error
    pub fn state_tree(msg: impl Into<String>) -> Self {
        Self::StateTree(msg.into())
    }

    /// Create an archive error
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a backend-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error means "the thing is absent" rather than a failure
    ///
    /// Expected absence is the only error class callers are allowed to swallow.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
