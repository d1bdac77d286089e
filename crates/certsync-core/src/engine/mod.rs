//! Certificate lifecycle engine
//!
//! The CertSyncEngine is responsible for:
//! - Restoring the authority tree from the snapshot
//! - Deciding, per domain, between issue, import, renew and skip
//! - Driving the authority client and the certificate store accordingly
//! - Archiving the tree back and cleaning the workspace
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────┐
//!                │ Synchronizer │◀── restore / archive / cleanup
//!                └──────────────┘
//!                        │
//!                        ▼
//! ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐
//! │ Certificate  │◀─│ CertSync     │─▶│ CertificateAuthority│
//! │ Store        │  │ Engine       │  │ (issue / renew)     │
//! └──────────────┘  └──────────────┘  └────────────────────┘
//!                        │
//!                        ▼
//!                ┌──────────────┐
//!                │   Events     │
//!                └──────────────┘
//! ```
//!
//! ## Decision Table
//!
//! | Inventory | Local tree  | Condition         | Action                  | Counters           |
//! |-----------|-------------|-------------------|-------------------------|--------------------|
//! | absent    | absent      | probe denied      | skip                    | skipped            |
//! | absent    | absent      | probe allowed     | issue, import           | new, imported      |
//! | absent    | present     |                   | import                  | imported           |
//! | present   |             | days >= threshold | skip                    | skipped            |
//! | present   |             | days < threshold  | repair, renew, replace  | renewed, imported  |
//!
//! Domains are processed one at a time in configuration order. A failure
//! aborts only the current domain.

use crate::config::CertSyncConfig;
use crate::error::{Error, Result};
use crate::expiry::{days_until_expiry_now, needs_renewal};
use crate::policy::PolicyValidator;
use crate::sync::{RestoreOutcome, Synchronizer};
use crate::traits::{
    CertificateAuthority, CertificateInventory, CertificateStore, IssueRequest, ObjectStorage,
};
use crate::tree::StateTree;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Message reported when there is nothing to process
pub const NOOP_MESSAGE: &str = "nothing to do. Please set DOMAINS_LIST and DOMAINS_EMAIL.";

/// Why a domain was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    /// The challenge bucket refused the write/delete probe
    ChallengeDenied,
    /// The certificate is valid for at least the threshold
    NotDue {
        /// Whole days until expiration
        days_until_expiry: i64,
    },
}

/// Result of processing one domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainOutcome {
    /// A fresh certificate was issued and imported
    Issued {
        /// Store identifier of the new record
        id: String,
    },
    /// A certificate already in the local tree was imported
    Imported {
        /// Store identifier of the new record
        id: String,
    },
    /// The lineage was renewed and the store record replaced
    Renewed {
        /// Store identifier (unchanged)
        id: String,
        /// Archive version the live links pointed at before renewal
        previous_version: u32,
    },
    /// Nothing was done
    Skipped(SkipReason),
}

/// Events emitted by the CertSyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Run started with an actionable configuration
    RunStarted {
        domains: usize,
    },

    /// Snapshot downloaded and unpacked
    SnapshotRestored {
        bytes: usize,
    },

    /// Domain left alone
    DomainSkipped {
        domain: String,
        reason: SkipReason,
    },

    /// Fresh certificate issued into the local tree
    CertificateIssued {
        domain: String,
    },

    /// Existing lineage renewed
    CertificateRenewed {
        domain: String,
    },

    /// Material imported into the certificate store
    CertificateImported {
        domain: String,
        id: String,
        replaced: bool,
    },

    /// Domain aborted with an error
    DomainFailed {
        domain: String,
        error: String,
    },

    /// Snapshot uploaded
    SnapshotArchived {
        bytes: usize,
    },

    /// Run finished
    RunFinished {
        counters: RunCounters,
    },
}

/// Per-run counters, never persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub new: u32,
    pub renewed: u32,
    pub imported: u32,
    pub skipped: u32,
}

impl RunCounters {
    /// Human readable summary
    pub fn message(&self) -> String {
        format!(
            "{} new certs, {} renewed certs, {} certs imported and {} certs skipped.",
            self.new, self.renewed, self.imported, self.skipped
        )
    }
}

/// A domain that aborted with an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainFailure {
    pub domain: String,
    pub error: String,
}

/// The structured result of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub message: String,
    #[serde(flatten)]
    pub counters: RunCounters,
    pub failures: Vec<DomainFailure>,
    pub warnings: Vec<String>,
}

impl RunReport {
    /// Report for a run that had nothing to process
    pub fn noop() -> Self {
        Self {
            message: NOOP_MESSAGE.to_string(),
            counters: RunCounters::default(),
            failures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn finished(counters: RunCounters, failures: Vec<DomainFailure>, warnings: Vec<String>) -> Self {
        Self {
            message: counters.message(),
            counters,
            failures,
            warnings,
        }
    }

    /// Whether every domain completed without error
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Certificate lifecycle engine
///
/// ## Lifecycle
///
/// 1. Create with [`CertSyncEngine::new()`]
/// 2. Call [`CertSyncEngine::run()`] once per invocation
/// 3. Drop
///
/// The engine assumes it is the only process working on the snapshot and
/// the workspace; nothing locks either.
pub struct CertSyncEngine {
    /// Certificate store holding the served inventory
    store: Box<dyn CertificateStore>,

    /// ACME client
    authority: Box<dyn CertificateAuthority>,

    /// Challenge permission probe
    policy: PolicyValidator,

    /// Snapshot transport and local tree
    sync: Synchronizer,

    /// Domains in processing order
    domains: Vec<String>,

    /// Contact address for issuance
    contact: String,

    /// Renewal threshold in days
    renew_days_before_expiration: i64,

    /// Whether the configuration has anything to do
    actionable: bool,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl CertSyncEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `storage`: object storage for challenges and the snapshot
    /// - `store`: certificate store
    /// - `authority`: ACME client
    /// - `config`: run configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        store: Box<dyn CertificateStore>,
        authority: Box<dyn CertificateAuthority>,
        config: CertSyncConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);
        let actionable = config.is_actionable();

        let tree = StateTree::new(config.workspace.root);
        let engine = Self {
            store,
            authority,
            policy: PolicyValidator::new(storage.clone()),
            sync: Synchronizer::new(storage, config.snapshot, tree),
            domains: config.domains,
            contact: config.contact,
            renew_days_before_expiration: config.renew_days_before_expiration,
            actionable,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// The local authority tree
    pub fn tree(&self) -> &StateTree {
        self.sync.tree()
    }

    /// Run one full pass over the configured domains
    ///
    /// # Returns
    ///
    /// - `Ok(RunReport)`: counts, per-domain failures and warnings
    /// - `Err(Error)`: the inventory could not be listed
    pub async fn run(&self) -> Result<RunReport> {
        if !self.actionable {
            info!("{}", NOOP_MESSAGE);
            return Ok(RunReport::noop());
        }

        self.emit_event(EngineEvent::RunStarted {
            domains: self.domains.len(),
        });
        info!(
            "Processing {} domain(s) with {} / {} / {}",
            self.domains.len(),
            self.store.store_name(),
            self.authority.authority_name(),
            self.renew_days_before_expiration
        );

        let mut warnings = Vec::new();
        self.restore(&mut warnings).await;

        let inventory = CertificateInventory::new(self.store.list().await?);
        debug!("Inventory holds {} certificate(s)", inventory.len());

        let mut counters = RunCounters::default();
        let mut failures = Vec::new();

        for domain in &self.domains {
            match self.process_domain(domain, &inventory, &mut counters).await {
                Ok(outcome) => debug!(domain = %domain, "Outcome: {:?}", outcome),
                Err(e) => {
                    error!(domain = %domain, "Processing failed: {}", e);
                    self.emit_event(EngineEvent::DomainFailed {
                        domain: domain.clone(),
                        error: e.to_string(),
                    });
                    failures.push(DomainFailure {
                        domain: domain.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        match self.sync.archive().await {
            Ok(bytes) => self.emit_event(EngineEvent::SnapshotArchived { bytes }),
            Err(e) => {
                warn!("Failed to archive the authority tree: {}", e);
                warnings.push(format!("archive failed: {}", e));
            }
        }

        if let Err(e) = self.sync.cleanup_workspace().await {
            warn!("Failed to clean up the workspace: {}", e);
            warnings.push(format!("cleanup failed: {}", e));
        }

        let report = RunReport::finished(counters, failures, warnings);
        info!("{}", report.message);
        self.emit_event(EngineEvent::RunFinished { counters });
        Ok(report)
    }

    /// Restore the snapshot, degrading to an empty tree on any failure
    async fn restore(&self, warnings: &mut Vec<String>) {
        match self.sync.restore().await {
            Ok(RestoreOutcome::Restored { bytes }) => {
                self.emit_event(EngineEvent::SnapshotRestored { bytes });
            }
            Ok(RestoreOutcome::Empty { .. }) => {}
            Err(e) => {
                warn!("Snapshot could not be restored, starting from an empty tree: {}", e);
                warnings.push(format!("restore failed: {}", e));
                if let Err(e) = self.tree().remove().await {
                    warn!("Failed to clear partially restored tree: {}", e);
                }
            }
        }
    }

    /// Apply the decision table to one domain
    async fn process_domain(
        &self,
        domain: &str,
        inventory: &CertificateInventory,
        counters: &mut RunCounters,
    ) -> Result<DomainOutcome> {
        let Some(summary) = inventory.lookup(domain) else {
            return self.issue_or_import(domain, counters).await;
        };

        let not_after = match summary.not_after {
            Some(not_after) => not_after,
            None => self.store.describe(&summary.id).await?.not_after,
        };
        let days = days_until_expiry_now(not_after);

        if !needs_renewal(days, self.renew_days_before_expiration) {
            info!(
                domain = %domain,
                "Certificate expires in {} days, threshold is {}; skipping",
                days, self.renew_days_before_expiration
            );
            return Ok(self.skip(domain, SkipReason::NotDue { days_until_expiry: days }, counters));
        }

        info!(domain = %domain, "Certificate expires in {} days, renewing", days);
        self.renew_and_replace(domain, &summary.id, counters).await
    }

    /// Paths for a domain with no store record
    async fn issue_or_import(&self, domain: &str, counters: &mut RunCounters) -> Result<DomainOutcome> {
        let issued = if self.tree().has_local_cert(domain).await? {
            info!(domain = %domain, "Certificate found in the local tree, importing");
            false
        } else {
            if !self.policy.can_serve_challenge(domain).await {
                error!(
                    domain = %domain,
                    "Cannot serve HTTP-01 challenges: put and delete on bucket {} are required",
                    domain
                );
                return Ok(self.skip(domain, SkipReason::ChallengeDenied, counters));
            }

            info!(domain = %domain, "Requesting a new certificate");
            self.authority
                .issue(IssueRequest {
                    domain,
                    contact: &self.contact,
                    dirs: self.tree().dirs(),
                })
                .await?;
            counters.new += 1;
            self.emit_event(EngineEvent::CertificateIssued {
                domain: domain.to_string(),
            });
            true
        };

        let id = self.import(domain, None).await?;
        counters.imported += 1;

        Ok(if issued {
            DomainOutcome::Issued { id }
        } else {
            DomainOutcome::Imported { id }
        })
    }

    /// Repair links, renew, then replace the store record in place
    ///
    /// The three steps only exist together: the client resolves the live
    /// links during renewal, and a renewal not followed by an import would
    /// leave the store serving the old certificate.
    async fn renew_and_replace(
        &self,
        domain: &str,
        id: &str,
        counters: &mut RunCounters,
    ) -> Result<DomainOutcome> {
        let previous_version = self.sync.repair_symlinks(domain).await?;
        debug!(domain = %domain, "Live links point at version {}", previous_version);

        self.authority.renew(domain, self.tree().dirs()).await?;
        counters.renewed += 1;
        self.emit_event(EngineEvent::CertificateRenewed {
            domain: domain.to_string(),
        });

        let new_id = self.import(domain, Some(id)).await?;
        counters.imported += 1;
        if new_id != id {
            warn!(domain = %domain, "Store replaced {} under a new id {}", id, new_id);
        }

        Ok(DomainOutcome::Renewed {
            id: new_id,
            previous_version,
        })
    }

    async fn import(&self, domain: &str, existing_id: Option<&str>) -> Result<String> {
        let material = self.tree().load_material(domain).await?;
        let id = self
            .store
            .import(material, existing_id)
            .await
            .map_err(|e| match e {
                Error::NotFound(_) | Error::PermissionDenied(_) => e,
                other => Error::certificate_store(format!("import failed: {}", other)),
            })?;

        info!(domain = %domain, "Imported certificate {}", id);
        self.emit_event(EngineEvent::CertificateImported {
            domain: domain.to_string(),
            id: id.clone(),
            replaced: existing_id.is_some(),
        });
        Ok(id)
    }

    fn skip(&self, domain: &str, reason: SkipReason, counters: &mut RunCounters) -> DomainOutcome {
        counters.skipped += 1;
        self.emit_event(EngineEvent::DomainSkipped {
            domain: domain.to_string(),
            reason,
        });
        DomainOutcome::Skipped(reason)
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // Slow consumers lose events rather than stall the run
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
