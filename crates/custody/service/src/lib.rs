//! Custody Service - Action orchestration for evidence custody
//!
//! Wires the custody components together: an upload or transfer writes one
//! record-store entry and one audit entry; a verification reads the merged
//! view (or a single remote row) and always writes an audit entry recording
//! the outcome. Timelines and queries are pure read-side projections.

#![deny(unsafe_code)]

pub mod report;

pub use report::ComplianceReport;

use chrono::Utc;
use custody_access::{AccessController, AccessError, Capability};
use custody_audit::{AuditError, AuditLog};
use custody_certificate::Certificate;
use custody_chain::{fetch_history, ChainError, ContentStore, EvidenceLedger};
use custody_digest::sha256_hex;
use custody_store::{RecordQuery, RecordStore, StoreError};
use custody_timeline::TimelineEvent;
use custody_types::{
    build_description, parse_description, ActionType, AuditEntry, EventType, EvidenceMeta,
    EvidenceRecord, PartyId, RecordOrigin, RecordState, Role, VerificationOutcome,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Install a console tracing subscriber honoring `RUST_LOG`. Intended for
/// binaries embedding the service; safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Inputs for an evidence upload.
#[derive(Clone, Debug, Default)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub name: String,
    pub case_id: String,
    pub investigator: String,
    pub location: String,
    pub notes: String,
}

/// Result of one verification attempt. The outcome is also recorded in the
/// audit trail; this report is the caller-facing view.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub outcome: VerificationOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub detail: String,
}

/// One session of the custody subsystem, bound to an acting identity.
pub struct CustodyService {
    identity: PartyId,
    ledger: Arc<dyn EvidenceLedger>,
    content: Arc<dyn ContentStore>,
    records: RecordStore,
    audit: Arc<AuditLog>,
    access: Arc<AccessController>,
}

impl CustodyService {
    pub fn new(
        identity: PartyId,
        ledger: Arc<dyn EvidenceLedger>,
        content: Arc<dyn ContentStore>,
        records: RecordStore,
        audit: Arc<AuditLog>,
        access: Arc<AccessController>,
    ) -> Self {
        Self {
            identity,
            ledger,
            content,
            records,
            audit,
            access,
        }
    }

    pub fn identity(&self) -> &PartyId {
        &self.identity
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn access(&self) -> &AccessController {
        &self.access
    }

    /// Upload evidence: digest the content, store it, submit the row to the
    /// ledger, then record the action locally as pending.
    pub async fn upload(&self, request: UploadRequest) -> Result<EvidenceRecord, CustodyError> {
        let role = self.access.require(&self.identity, Capability::Upload)?;

        let sha256 = sha256_hex(&request.bytes);
        let content_ref = self.content.put(&request.bytes).await?;

        let meta = EvidenceMeta {
            sha256,
            case_id: request.case_id.trim().to_string(),
            investigator: request.investigator.trim().to_string(),
            location: request.location.trim().to_string(),
            notes: request.notes.trim().to_string(),
        };
        let description = build_description(&meta);

        let confirmation = self
            .ledger
            .submit(&request.name, &description, &content_ref)
            .await?;
        info!(name = %request.name, content_ref = %content_ref, "evidence submitted");

        let record = EvidenceRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name.clone(),
            meta: meta.clone(),
            content_ref: content_ref.clone(),
            holder: self.identity.clone(),
            event_type: EventType::Upload,
            timestamp: Utc::now(),
            origin: RecordOrigin::LocalPending,
            // The ledger ref is taken from the remote counterpart at
            // reconciliation; until then the record stays pending.
            ledger_ref: None,
            state: RecordState::Pending,
            role: Some(role),
            transfer_from: None,
        };
        self.records.insert_local(record.clone()).await?;

        let entry = AuditEntry::new(
            self.identity.clone(),
            format!("Uploaded evidence: {}", request.name),
            ActionType::Upload,
        )
        .with_role(Some(role))
        .with_evidence_hash(&content_ref)
        .with_metadata("sha256", &meta.sha256)
        .with_metadata("caseId", &meta.case_id)
        .with_metadata("investigator", &meta.investigator)
        .with_metadata("location", &meta.location)
        .with_metadata("confirmationRef", &confirmation);
        self.audit.append(entry).await?;

        Ok(record)
    }

    /// Transfer possession of evidence to another identity. The transfer is
    /// recorded locally as pending; ledger confirmation arrives later via
    /// refresh and reconciliation.
    pub async fn transfer(
        &self,
        hash: &str,
        to: PartyId,
    ) -> Result<EvidenceRecord, CustodyError> {
        let role = self.access.require(&self.identity, Capability::Transfer)?;

        let record = EvidenceRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: format!("Transfer: {}", truncate(hash, 10)),
            meta: EvidenceMeta::default(),
            content_ref: hash.to_string(),
            holder: to.clone(),
            event_type: EventType::Transfer,
            timestamp: Utc::now(),
            origin: RecordOrigin::LocalPending,
            ledger_ref: None,
            state: RecordState::Pending,
            role: Some(role),
            transfer_from: Some(self.identity.clone()),
        };
        self.records.insert_local(record.clone()).await?;
        info!(hash = %hash, to = %to, "evidence transferred");

        let entry = AuditEntry::new(
            self.identity.clone(),
            format!("Transferred evidence to {}", to.short()),
            ActionType::Transfer,
        )
        .with_role(Some(role))
        .with_evidence_hash(hash);
        self.audit.append(entry).await?;

        Ok(record)
    }

    /// Verify content against the record located by hash in the merged
    /// view. Every outcome writes exactly one audit entry.
    pub async fn verify_local(
        &self,
        bytes: &[u8],
        hash: &str,
    ) -> Result<VerificationReport, CustodyError> {
        let role = self.access.require(&self.identity, Capability::Verify)?;

        let Some(record) = self.records.by_hash(hash)? else {
            self.append_verification(
                role,
                "Verification failed: record not found",
                VerificationOutcome::NotFound,
                Some(hash),
                None,
                &[],
            )
            .await?;
            return Ok(VerificationReport {
                outcome: VerificationOutcome::NotFound,
                computed_sha256: None,
                stored_sha256: None,
                record_id: None,
                detail: "No evidence record found for that hash.".to_string(),
            });
        };

        if !record.meta.has_digest() {
            self.append_verification(
                role,
                "Verification failed: missing digest",
                VerificationOutcome::MissingDigest,
                Some(hash),
                None,
                &[],
            )
            .await?;
            return Ok(VerificationReport {
                outcome: VerificationOutcome::MissingDigest,
                computed_sha256: None,
                stored_sha256: None,
                record_id: Some(record.id),
                detail: "No digest stored for this record.".to_string(),
            });
        }

        let computed = sha256_hex(bytes);
        let outcome = if computed.eq_ignore_ascii_case(&record.meta.sha256) {
            VerificationOutcome::Match
        } else {
            warn!(hash = %hash, "digest mismatch detected");
            VerificationOutcome::Mismatch
        };

        let action = match outcome {
            VerificationOutcome::Match => "Verification passed for evidence",
            _ => "Verification failed for evidence",
        };
        self.append_verification(
            role,
            action,
            outcome,
            Some(hash),
            None,
            &[("sha256", computed.as_str())],
        )
        .await?;

        Ok(VerificationReport {
            outcome,
            computed_sha256: Some(computed),
            stored_sha256: Some(record.meta.sha256.clone()),
            record_id: Some(record.id),
            detail: match outcome {
                VerificationOutcome::Match => "Integrity verified. Digests match.".to_string(),
                _ => "Digest mismatch. Possible tampering.".to_string(),
            },
        })
    }

    /// Verify content against a single ledger row fetched by its 1-based
    /// index, bypassing the merged cache. Every outcome, including fetch
    /// failure, writes exactly one audit entry.
    pub async fn verify_remote(
        &self,
        bytes: &[u8],
        record_index: u64,
    ) -> Result<VerificationReport, CustodyError> {
        let role = self.access.require(&self.identity, Capability::Verify)?;
        let index = record_index.to_string();

        let row = match self.ledger.record_at(record_index).await {
            Ok(row) => row,
            Err(ChainError::NotFound(_)) => {
                self.append_verification(
                    role,
                    "Remote verification failed: record not found",
                    VerificationOutcome::NotFound,
                    None,
                    Some(&index),
                    &[],
                )
                .await?;
                return Ok(VerificationReport {
                    outcome: VerificationOutcome::NotFound,
                    computed_sha256: None,
                    stored_sha256: None,
                    record_id: Some(index),
                    detail: "No ledger record at that index.".to_string(),
                });
            }
            Err(err) => {
                warn!(error = %err, "remote verification error");
                self.append_verification(
                    role,
                    "Remote verification error",
                    VerificationOutcome::Error,
                    None,
                    Some(&index),
                    &[("error", err.to_string().as_str())],
                )
                .await?;
                return Ok(VerificationReport {
                    outcome: VerificationOutcome::Error,
                    computed_sha256: None,
                    stored_sha256: None,
                    record_id: Some(index),
                    detail: format!("Remote verification error: {err}"),
                });
            }
        };

        let meta = parse_description(&row.description);
        if !meta.has_digest() {
            self.append_verification(
                role,
                "Remote verification failed: missing digest",
                VerificationOutcome::MissingDigest,
                Some(&row.content_ref),
                Some(&index),
                &[],
            )
            .await?;
            return Ok(VerificationReport {
                outcome: VerificationOutcome::MissingDigest,
                computed_sha256: None,
                stored_sha256: None,
                record_id: Some(index),
                detail: "Ledger record has no digest stored.".to_string(),
            });
        }

        let computed = sha256_hex(bytes);
        let outcome = if computed.eq_ignore_ascii_case(&meta.sha256) {
            VerificationOutcome::Match
        } else {
            VerificationOutcome::Mismatch
        };

        let action = match outcome {
            VerificationOutcome::Match => "Remote verification passed",
            _ => "Remote verification failed",
        };
        self.append_verification(
            role,
            action,
            outcome,
            Some(&row.content_ref),
            Some(&index),
            &[
                ("sha256", computed.as_str()),
                ("ledgerSha256", meta.sha256.as_str()),
            ],
        )
        .await?;

        Ok(VerificationReport {
            outcome,
            computed_sha256: Some(computed),
            stored_sha256: Some(meta.sha256),
            record_id: Some(index),
            detail: match outcome {
                VerificationOutcome::Match => {
                    "Ledger integrity verified. Digests match.".to_string()
                }
                _ => "Ledger digest mismatch. Possible tampering.".to_string(),
            },
        })
    }

    /// One verification outcome, one audit entry.
    async fn append_verification(
        &self,
        role: Role,
        action: &str,
        outcome: VerificationOutcome,
        evidence_hash: Option<&str>,
        evidence_id: Option<&str>,
        extra: &[(&str, &str)],
    ) -> Result<(), CustodyError> {
        let mut entry = AuditEntry::new(self.identity.clone(), action, ActionType::Verification)
            .with_role(Some(role))
            .with_metadata("verificationResult", outcome.as_str());
        if let Some(hash) = evidence_hash {
            entry = entry.with_evidence_hash(hash);
        }
        if let Some(id) = evidence_id {
            entry = entry.with_evidence_id(id);
        }
        for (key, value) in extra {
            entry = entry.with_metadata(*key, *value);
        }
        self.audit.append(entry).await?;
        Ok(())
    }

    /// Refresh the remote record set from the ledger. Returns how many
    /// records the remote history now holds.
    pub async fn refresh_remote(&self) -> Result<usize, CustodyError> {
        let history = fetch_history(self.ledger.as_ref()).await?;
        let count = history.len();
        self.records.set_remote(history)?;
        Ok(count)
    }

    /// Confirm local pending records against the refreshed remote set.
    pub async fn reconcile(&self) -> Result<usize, CustodyError> {
        Ok(self.records.reconcile().await?)
    }

    /// Caller-driven timeout path for a pending record.
    pub async fn mark_failed(&self, record_id: &str) -> Result<(), CustodyError> {
        Ok(self.records.mark_failed(record_id).await?)
    }

    /// The merged evidence view.
    pub fn merged_view(&self) -> Result<Vec<EvidenceRecord>, CustodyError> {
        Ok(self.records.merged()?)
    }

    /// Filter the merged view, resolving roles through the role directory.
    pub fn search(&self, query: &RecordQuery) -> Result<Vec<EvidenceRecord>, CustodyError> {
        let view = self.records.merged()?;
        let roles = self.access.roles()?;
        Ok(query.apply(&view, &roles))
    }

    /// Chronology of one piece of evidence, recomputed on every call.
    pub fn timeline(&self, hash: &str) -> Result<Vec<TimelineEvent>, CustodyError> {
        let records = self.records.merged()?;
        let entries = self.audit.all()?;
        Ok(custody_timeline::timeline(hash, &records, &entries))
    }

    /// The audit trail, gated on the view-audit capability.
    pub fn audit_trail(&self) -> Result<Vec<AuditEntry>, CustodyError> {
        self.access.require(&self.identity, Capability::ViewAudit)?;
        Ok(self.audit.all()?)
    }

    /// Issue a proof-of-existence certificate for a record in the merged
    /// view.
    pub async fn issue_certificate(&self, record_id: &str) -> Result<Certificate, CustodyError> {
        let record = self
            .records
            .by_id(record_id)?
            .ok_or_else(|| CustodyError::NotFound(record_id.to_string()))?;

        let certificate = custody_certificate::issue(&record, Utc::now());

        let entry = AuditEntry::new(
            self.identity.clone(),
            format!("Generated PoE certificate for evidence: {}", record.name),
            ActionType::CertificateGenerated,
        )
        .with_role(self.access.role_of(&self.identity)?)
        .with_evidence_hash(&record.content_ref)
        .with_evidence_id(&record.id)
        .with_metadata("certificateNumber", &certificate.certificate_number);
        self.audit.append(entry).await?;

        Ok(certificate)
    }

    /// Compliance summary over the current merged view and role directory.
    pub async fn compliance_report(&self) -> Result<ComplianceReport, CustodyError> {
        let role = self.access.require(&self.identity, Capability::ViewAudit)?;

        let view = self.records.merged()?;
        let transfers = view
            .iter()
            .filter(|r| r.event_type == EventType::Transfer)
            .count();
        let report = ComplianceReport::new(
            self.identity.clone(),
            view.len(),
            &self.access.roles()?,
            transfers,
            self.audit.len()?,
        );

        let entry = AuditEntry::new(
            self.identity.clone(),
            "Generated compliance report",
            ActionType::ReportGenerated,
        )
        .with_role(Some(role));
        self.audit.append(entry).await?;

        Ok(report)
    }

    /// Export the local history as a backup document.
    pub async fn export_backup(&self) -> Result<String, CustodyError> {
        let records = self.records.local_records()?;
        let payload = custody_store::export_backup(Some(&self.identity), &records, Utc::now())?;

        let entry = AuditEntry::new(
            self.identity.clone(),
            "Local history backup exported",
            ActionType::LocalBackup,
        )
        .with_role(self.access.role_of(&self.identity)?)
        .with_metadata("records", records.len());
        self.audit.append(entry).await?;

        Ok(payload)
    }

    /// Restore the local history from a backup payload, replacing the
    /// entire cache for this identity.
    pub async fn restore_backup(&self, payload: &str) -> Result<usize, CustodyError> {
        let restored = custody_store::parse_backup(payload)?;
        let count = restored.records.len();
        self.records.replace_local(restored.records).await?;
        info!(records = count, "local history restored");

        let entry = AuditEntry::new(
            self.identity.clone(),
            "Local history restored from backup",
            ActionType::LocalRestore,
        )
        .with_role(self.access.role_of(&self.identity)?)
        .with_metadata("records", count)
        .with_metadata(
            "sourceWallet",
            restored.source_wallet.map(|w| w.to_string()),
        );
        self.audit.append(entry).await?;

        Ok(count)
    }
}

fn truncate(value: &str, max: usize) -> &str {
    value.get(..max).unwrap_or(value)
}

/// Service-level errors, mapping each failure to the custody taxonomy.
/// Digest mismatches are not errors; they surface as
/// [`VerificationOutcome::Mismatch`] in the verification report.
#[derive(Debug, Error)]
pub enum CustodyError {
    #[error("connectivity error: {0}")]
    Connectivity(String),

    #[error(transparent)]
    Authorization(#[from] AccessError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed payload: {0}")]
    Format(String),

    #[error("submission failed: {0}")]
    Transaction(String),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Store(StoreError),

    #[error("lock error")]
    LockError,
}

impl From<ChainError> for CustodyError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Connectivity(message) => Self::Connectivity(message),
            ChainError::Transaction(message) => Self::Transaction(message),
            ChainError::NotFound(index) => Self::NotFound(format!("ledger record {index}")),
            ChainError::LockError => Self::LockError,
        }
    }
}

impl From<StoreError> for CustodyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Format(message) => Self::Format(message),
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}
