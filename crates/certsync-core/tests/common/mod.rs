//! Test doubles and common utilities for contract tests
//!
//! The doubles record how the engine uses them (atomic call counters,
//! recorded arguments) and act on the local tree the way the real
//! collaborators do, without any network.

#![allow(dead_code)]

use async_trait::async_trait;
use certsync_core::config::CertSyncConfig;
use certsync_core::error::{Error, Result};
use certsync_core::inventory::inspect_certificate;
use certsync_core::storage::MemoryObjectStorage;
use certsync_core::sync::Synchronizer;
use certsync_core::traits::{
    AuthorityDirs, CertificateAuthority, CertificateDetail, CertificateMaterial, CertificateStore,
    CertificateSummary, IssueRequest, ObjectStorage,
};
use certsync_core::tree::{CREDENTIAL_KINDS, StateTree};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Bucket holding the snapshot in every test
pub const STATE_BUCKET: &str = "certbot-state";

/// Snapshot key in every test
pub const STATE_KEY: &str = "certbot.tar.gz";

/// Minimal actionable configuration rooted at `workspace`
pub fn config(workspace: &Path, domains: &str) -> CertSyncConfig {
    CertSyncConfig::new()
        .with_domain_list(domains)
        .with_contact("ops@example.com")
        .with_renew_days(30)
        .with_snapshot(STATE_BUCKET, STATE_KEY)
        .with_workspace(workspace)
}

/// Storage with the state bucket and one bucket per domain
pub async fn storage_with_buckets(domains: &[&str]) -> MemoryObjectStorage {
    let storage = MemoryObjectStorage::new();
    storage.create_bucket(STATE_BUCKET).await;
    for domain in domains {
        storage.create_bucket(domain).await;
    }
    storage
}

/// PEM material for one lineage version
pub struct Pem {
    pub cert: String,
    pub chain: String,
    pub privkey: String,
}

impl Pem {
    /// Self-signed leaf for `domain` plus an unrelated self-signed "chain"
    pub fn mint(domain: &str) -> Self {
        use rcgen::{CertificateParams, KeyPair};

        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec![domain.to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();

        let issuer_key = KeyPair::generate().unwrap();
        let issuer = CertificateParams::new(vec!["issuer.test".to_string()])
            .unwrap()
            .self_signed(&issuer_key)
            .unwrap();

        Self {
            cert: cert.pem(),
            chain: issuer.pem(),
            privkey: key.serialize_pem(),
        }
    }

    fn kind(&self, kind: &str) -> String {
        match kind {
            "cert" => self.cert.clone(),
            "chain" => self.chain.clone(),
            "privkey" => self.privkey.clone(),
            _ => format!("{}{}", self.cert, self.chain),
        }
    }
}

/// Write `archive/<domain>/*<version>.pem` and point the live links at it
pub fn write_version(config_dir: &Path, domain: &str, version: u32, pem: &Pem) {
    let archive = config_dir.join("archive").join(domain);
    let live = config_dir.join("live").join(domain);
    std::fs::create_dir_all(&archive).unwrap();
    std::fs::create_dir_all(&live).unwrap();

    for kind in CREDENTIAL_KINDS {
        std::fs::write(archive.join(format!("{}{}.pem", kind, version)), pem.kind(kind)).unwrap();

        let link = live.join(format!("{}.pem", kind));
        let _ = std::fs::remove_file(&link);
        std::os::unix::fs::symlink(
            format!("../../archive/{}/{}{}.pem", domain, kind, version),
            &link,
        )
        .unwrap();
    }

    std::fs::create_dir_all(config_dir.join("renewal")).unwrap();
    std::fs::write(
        config_dir.join("renewal").join(format!("{}.conf", domain)),
        format!("archive_dir = archive/{}\n", domain),
    )
    .unwrap();
}

/// Upload a snapshot holding one lineage version per domain
///
/// The workspace is removed again afterwards, like at the end of a run.
pub async fn seed_snapshot(storage: &MemoryObjectStorage, workspace: &Path, domains: &[&str]) {
    let tree = StateTree::new(workspace);
    for domain in domains {
        write_version(tree.config_dir(), domain, 1, &Pem::mint(domain));
    }

    let sync = Synchronizer::new(
        Arc::new(storage.clone()),
        certsync_core::config::SnapshotConfig {
            bucket: STATE_BUCKET.to_string(),
            key: STATE_KEY.to_string(),
        },
        tree,
    );
    sync.archive().await.unwrap();
    sync.cleanup_workspace().await.unwrap();
}

/// What the authority saw when renew() was called
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewObservation {
    pub domain: String,
    /// Whether live/cert.pem was a symlink
    pub live_is_link: bool,
    /// Where live/cert.pem pointed
    pub live_target: Option<String>,
}

/// An authority that lays out a lineage like certbot does
#[derive(Clone, Default)]
pub struct RecordingAuthority {
    issue_calls: Arc<AtomicUsize>,
    renew_calls: Arc<AtomicUsize>,
    issued: Arc<Mutex<Vec<(String, String)>>>,
    renewals: Arc<Mutex<Vec<RenewObservation>>>,
    fail_for: Arc<Mutex<HashSet<String>>>,
}

impl RecordingAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call for `domain` fail
    pub fn fail_for(&self, domain: &str) {
        self.fail_for.lock().unwrap().insert(domain.to_string());
    }

    pub fn issue_call_count(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    pub fn renew_call_count(&self) -> usize {
        self.renew_calls.load(Ordering::SeqCst)
    }

    /// (domain, contact) of every issuance
    pub fn issued(&self) -> Vec<(String, String)> {
        self.issued.lock().unwrap().clone()
    }

    pub fn renewals(&self) -> Vec<RenewObservation> {
        self.renewals.lock().unwrap().clone()
    }

    fn check(&self, domain: &str) -> Result<()> {
        if self.fail_for.lock().unwrap().contains(domain) {
            return Err(Error::authority(format!("challenge failed for {}", domain)));
        }
        Ok(())
    }
}

#[async_trait]
impl CertificateAuthority for RecordingAuthority {
    async fn issue(&self, request: IssueRequest<'_>) -> Result<()> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        self.check(request.domain)?;

        write_version(&request.dirs.config, request.domain, 1, &Pem::mint(request.domain));
        self.issued
            .lock()
            .unwrap()
            .push((request.domain.to_string(), request.contact.to_string()));
        Ok(())
    }

    async fn renew(&self, domain: &str, dirs: &AuthorityDirs) -> Result<()> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);

        let live = dirs.config.join("live").join(domain).join("cert.pem");
        let live_is_link = std::fs::symlink_metadata(&live)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        let live_target = std::fs::read_link(&live)
            .ok()
            .map(|t| t.to_string_lossy().into_owned());
        self.renewals.lock().unwrap().push(RenewObservation {
            domain: domain.to_string(),
            live_is_link,
            live_target,
        });

        self.check(domain)?;

        // certbot refuses to renew through plain files
        if !live_is_link {
            return Err(Error::authority(format!("{} is not a symlink", live.display())));
        }

        let tree = StateTree::new(dirs.config.parent().unwrap());
        let next = tree.latest_archive_version(domain).await?.unwrap_or(0) + 1;
        write_version(&dirs.config, domain, next, &Pem::mint(domain));
        Ok(())
    }

    fn authority_name(&self) -> &'static str {
        "recording"
    }
}

/// One import as seen by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub domain: String,
    pub existing_id: Option<String>,
    pub returned_id: String,
}

/// A certificate store with a preset inventory and call counters
#[derive(Clone, Default)]
pub struct FakeCertificateStore {
    entries: Arc<Mutex<Vec<CertificateSummary>>>,
    list_calls: Arc<AtomicUsize>,
    describe_calls: Arc<AtomicUsize>,
    import_calls: Arc<AtomicUsize>,
    imports: Arc<Mutex<Vec<ImportRecord>>>,
    reject_imports: Arc<AtomicBool>,
    fail_list: Arc<AtomicBool>,
    hide_expiry: Arc<AtomicBool>,
    next_id: Arc<AtomicUsize>,
}

impl FakeCertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inventory entry expiring `days` (plus one hour) from now
    pub fn with_entry(self, id: &str, domain: &str, days: i64) -> Self {
        self.entries.lock().unwrap().push(CertificateSummary {
            id: id.to_string(),
            domain_name: domain.to_string(),
            not_after: Some(expiring_in(days)),
        });
        self
    }

    /// List without expiration so the engine has to describe()
    pub fn hide_expiry_in_listing(&self) {
        self.hide_expiry.store(true, Ordering::SeqCst);
    }

    pub fn reject_imports(&self) {
        self.reject_imports.store(true, Ordering::SeqCst);
    }

    pub fn fail_list(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn describe_call_count(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn import_call_count(&self) -> usize {
        self.import_calls.load(Ordering::SeqCst)
    }

    pub fn imports(&self) -> Vec<ImportRecord> {
        self.imports.lock().unwrap().clone()
    }

    pub fn entries(&self) -> Vec<CertificateSummary> {
        self.entries.lock().unwrap().clone()
    }
}

/// A timestamp that yields exactly `days` whole days from now
pub fn expiring_in(days: i64) -> DateTime<Utc> {
    Utc::now() + Duration::days(days) + Duration::hours(1)
}

#[async_trait]
impl CertificateStore for FakeCertificateStore {
    async fn list(&self) -> Result<Vec<CertificateSummary>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::certificate_store("listing throttled"));
        }

        let hide = self.hide_expiry.load(Ordering::SeqCst);
        Ok(self
            .entries()
            .into_iter()
            .map(|mut e| {
                if hide {
                    e.not_after = None;
                }
                e
            })
            .collect())
    }

    async fn describe(&self, id: &str) -> Result<CertificateDetail> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.entries()
            .into_iter()
            .find(|e| e.id == id)
            .and_then(|e| {
                Some(CertificateDetail {
                    id: e.id,
                    domain_name: e.domain_name,
                    not_after: e.not_after?,
                })
            })
            .ok_or_else(|| Error::not_found(format!("certificate {}", id)))
    }

    async fn import(
        &self,
        material: CertificateMaterial,
        existing_id: Option<&str>,
    ) -> Result<String> {
        self.import_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_imports.load(Ordering::SeqCst) {
            return Err(Error::invalid_input("certificate chain rejected"));
        }

        let facts = inspect_certificate(&material.certificate)?;
        let mut entries = self.entries.lock().unwrap();

        let id = match existing_id {
            Some(id) => {
                let entry = entries
                    .iter_mut()
                    .find(|e| e.id == id)
                    .ok_or_else(|| Error::not_found(format!("certificate {}", id)))?;
                entry.not_after = Some(facts.not_after);
                id.to_string()
            }
            None => {
                let id = format!("arn:fake:{}", self.next_id.fetch_add(1, Ordering::SeqCst));
                entries.push(CertificateSummary {
                    id: id.clone(),
                    domain_name: facts.domain_name.clone(),
                    not_after: Some(facts.not_after),
                });
                id
            }
        };

        self.imports.lock().unwrap().push(ImportRecord {
            domain: facts.domain_name,
            existing_id: existing_id.map(str::to_string),
            returned_id: id.clone(),
        });
        Ok(id)
    }

    fn store_name(&self) -> &'static str {
        "fake"
    }
}

/// Object storage that counts every call before delegating
#[derive(Clone, Default)]
pub struct CountingObjectStorage {
    inner: MemoryObjectStorage,
    calls: Arc<AtomicUsize>,
}

impl CountingObjectStorage {
    pub fn new(inner: MemoryObjectStorage) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStorage for CountingObjectStorage {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.put(bucket, key, body).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(bucket, key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(bucket, key).await
    }

    fn storage_name(&self) -> &'static str {
        "counting"
    }
}
