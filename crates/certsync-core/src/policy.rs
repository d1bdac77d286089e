//! Challenge permission probe
//!
//! HTTP-01 validation fails late and expensively when the execution
//! identity cannot write the token into the domain bucket. The probe writes
//! and deletes a throwaway object before any authority exchange starts.

use crate::traits::ObjectStorage;
use std::sync::Arc;
use tracing::{debug, warn};

/// Probes write + delete permission on a domain bucket
#[derive(Clone)]
pub struct PolicyValidator {
    storage: Arc<dyn ObjectStorage>,
}

impl PolicyValidator {
    /// Create a validator on top of the object storage used for challenges
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Whether the bucket named `domain` accepts both a put and a delete
    ///
    /// The probe object is zero bytes, named by a random UUID. Any failure,
    /// including a missing bucket, yields `false`; nothing is raised.
    pub async fn can_serve_challenge(&self, domain: &str) -> bool {
        let probe_key = uuid::Uuid::new_v4().to_string();

        if let Err(e) = self.storage.put(domain, &probe_key, Vec::new()).await {
            warn!(domain = %domain, "Probe write refused: {}", e);
            return false;
        }

        if let Err(e) = self.storage.delete(domain, &probe_key).await {
            warn!(domain = %domain, probe = %probe_key, "Probe delete refused: {}", e);
            return false;
        }

        debug!(domain = %domain, "Challenge permissions confirmed");
        true
    }
}

impl std::fmt::Debug for PolicyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyValidator")
            .field("storage", &self.storage.storage_name())
            .finish()
    }
}
