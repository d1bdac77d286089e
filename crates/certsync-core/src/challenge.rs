//! HTTP-01 challenge publication
//!
//! The authority client calls out to a hook before and after validation.
//! The hook publishes the key authorization into the domain bucket, which is
//! served at `http://<domain>/.well-known/acme-challenge/<token>`.

use crate::Error;
use crate::traits::ObjectStorage;
use std::sync::Arc;
use tracing::info;

/// Key prefix under which challenge tokens are served
pub const CHALLENGE_PREFIX: &str = ".well-known/acme-challenge";

/// Object key for `token`
pub fn challenge_key(token: &str) -> String {
    format!("{}/{}", CHALLENGE_PREFIX, token)
}

/// Writes and removes challenge responses in domain buckets
#[derive(Clone)]
pub struct ChallengePublisher {
    storage: Arc<dyn ObjectStorage>,
}

impl ChallengePublisher {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Publish `validation` for `token` in the bucket named `domain`
    pub async fn publish(&self, domain: &str, token: &str, validation: &str) -> Result<(), Error> {
        validate_token(token)?;
        let key = challenge_key(token);
        self.storage
            .put(domain, &key, validation.as_bytes().to_vec())
            .await?;
        info!(domain = %domain, "Published challenge {}", key);
        Ok(())
    }

    /// Remove the response for `token`; already-absent is fine
    pub async fn remove(&self, domain: &str, token: &str) -> Result<(), Error> {
        validate_token(token)?;
        let key = challenge_key(token);
        match self.storage.delete(domain, &key).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        info!(domain = %domain, "Removed challenge {}", key);
        Ok(())
    }
}

impl std::fmt::Debug for ChallengePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengePublisher")
            .field("storage", &self.storage.storage_name())
            .finish()
    }
}

// ACME tokens are base64url
fn validate_token(token: &str) -> Result<(), Error> {
    if token.is_empty()
        || !token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(Error::invalid_input(format!("invalid challenge token: {:?}", token)));
    }
    Ok(())
}
