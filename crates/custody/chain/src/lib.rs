//! Custody Chain - Remote ledger and content-store interfaces
//!
//! The authoritative record set lives on an external immutable ledger and
//! the file bytes in a content-addressable store. This crate defines the
//! consumed surfaces, the mapping from ledger rows to evidence records, and
//! in-memory implementations for tests and offline development.

#![deny(unsafe_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custody_types::{
    parse_description, EventType, EvidenceRecord, PartyId, RecordOrigin, RecordState,
};
use std::sync::RwLock;
use thiserror::Error;
use tracing::debug;

/// Default read-side gateway for fetching content by its address.
pub const DEFAULT_CONTENT_GATEWAY: &str = "https://gateway.pinata.cloud/ipfs";

/// One row of the remote ledger. Rows are 1-indexed and immutable.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainRecord {
    pub id: u64,
    pub name: String,
    /// Tagged metadata document; parsed tolerantly on read.
    pub description: String,
    pub content_ref: String,
    pub holder: PartyId,
    /// Unix seconds, as the ledger stores it.
    pub timestamp: i64,
}

/// The consumed ledger surface. Submission suspends until acknowledged.
#[async_trait]
pub trait EvidenceLedger: Send + Sync {
    async fn count(&self) -> Result<u64, ChainError>;

    /// Fetch the row at a 1-based index.
    async fn record_at(&self, index: u64) -> Result<ChainRecord, ChainError>;

    /// Submit a new evidence row; returns the confirming transaction ref.
    async fn submit(
        &self,
        name: &str,
        description: &str,
        content_ref: &str,
    ) -> Result<String, ChainError>;
}

/// The consumed content-store surface. Content is written here once and
/// fetched for display through the read-only gateway.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put(&self, bytes: &[u8]) -> Result<String, ChainError>;
}

/// Read-side URL for a stored content address.
pub fn gateway_url(gateway_base: &str, content_ref: &str) -> String {
    format!("{}/{}", gateway_base.trim_end_matches('/'), content_ref)
}

/// Convert a ledger row into an evidence record. Remote rows are always
/// confirmed uploads; the row id doubles as the ledger reference.
pub fn record_from_row(row: ChainRecord) -> EvidenceRecord {
    let meta = parse_description(&row.description);
    let timestamp = DateTime::<Utc>::from_timestamp(row.timestamp, 0).unwrap_or_else(Utc::now);
    EvidenceRecord {
        id: row.id.to_string(),
        name: row.name,
        meta,
        content_ref: row.content_ref,
        holder: row.holder,
        event_type: EventType::Upload,
        timestamp,
        origin: RecordOrigin::Remote,
        ledger_ref: Some(row.id.to_string()),
        state: RecordState::Confirmed,
        role: None,
        transfer_from: None,
    }
}

/// Fetch the full remote history, newest first.
pub async fn fetch_history(ledger: &dyn EvidenceLedger) -> Result<Vec<EvidenceRecord>, ChainError> {
    let total = ledger.count().await?;
    let mut records = Vec::with_capacity(total as usize);
    for index in 1..=total {
        let row = ledger.record_at(index).await?;
        records.push(record_from_row(row));
    }
    records.reverse();
    debug!(records = records.len(), "fetched remote history");
    Ok(records)
}

/// In-memory ledger for tests and offline development. Can be switched
/// offline to exercise connectivity failures.
pub struct MemoryLedger {
    rows: RwLock<Vec<ChainRecord>>,
    submitter: PartyId,
    offline: RwLock<bool>,
}

impl MemoryLedger {
    pub fn new(submitter: PartyId) -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            submitter,
            offline: RwLock::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut flag) = self.offline.write() {
            *flag = offline;
        }
    }

    fn check_online(&self) -> Result<(), ChainError> {
        let offline = self.offline.read().map_err(|_| ChainError::LockError)?;
        if *offline {
            Err(ChainError::Connectivity("ledger unreachable".to_string()))
        } else {
            Ok(())
        }
    }

    /// Seed a row directly, bypassing submission. Test hook.
    pub fn seed(&self, row: ChainRecord) -> Result<(), ChainError> {
        let mut rows = self.rows.write().map_err(|_| ChainError::LockError)?;
        rows.push(row);
        Ok(())
    }
}

#[async_trait]
impl EvidenceLedger for MemoryLedger {
    async fn count(&self) -> Result<u64, ChainError> {
        self.check_online()?;
        let rows = self.rows.read().map_err(|_| ChainError::LockError)?;
        Ok(rows.len() as u64)
    }

    async fn record_at(&self, index: u64) -> Result<ChainRecord, ChainError> {
        self.check_online()?;
        let rows = self.rows.read().map_err(|_| ChainError::LockError)?;
        if index == 0 || index as usize > rows.len() {
            return Err(ChainError::NotFound(index));
        }
        Ok(rows[index as usize - 1].clone())
    }

    async fn submit(
        &self,
        name: &str,
        description: &str,
        content_ref: &str,
    ) -> Result<String, ChainError> {
        self.check_online()?;
        let mut rows = self.rows.write().map_err(|_| ChainError::LockError)?;
        let id = rows.len() as u64 + 1;
        rows.push(ChainRecord {
            id,
            name: name.to_string(),
            description: description.to_string(),
            content_ref: content_ref.to_string(),
            holder: self.submitter.clone(),
            timestamp: Utc::now().timestamp(),
        });
        Ok(format!("tx-{id}"))
    }
}

/// In-memory content-addressable store keyed by content digest.
pub struct MemoryContentStore {
    blobs: RwLock<Vec<(String, Vec<u8>)>>,
    offline: RwLock<bool>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(Vec::new()),
            offline: RwLock::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut flag) = self.offline.write() {
            *flag = offline;
        }
    }

    pub fn get(&self, content_ref: &str) -> Option<Vec<u8>> {
        let blobs = self.blobs.read().ok()?;
        blobs
            .iter()
            .find(|(r, _)| r == content_ref)
            .map(|(_, b)| b.clone())
    }
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, bytes: &[u8]) -> Result<String, ChainError> {
        {
            let offline = self.offline.read().map_err(|_| ChainError::LockError)?;
            if *offline {
                return Err(ChainError::Connectivity(
                    "content store unreachable".to_string(),
                ));
            }
        }
        let content_ref = format!("Qm{}", &custody_digest::sha256_hex(bytes)[..32]);
        let mut blobs = self.blobs.write().map_err(|_| ChainError::LockError)?;
        if !blobs.iter().any(|(r, _)| r == &content_ref) {
            blobs.push((content_ref.clone(), bytes.to_vec()));
        }
        Ok(content_ref)
    }
}

/// Chain-facing errors.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("connectivity error: {0}")]
    Connectivity(String),

    #[error("submission failed: {0}")]
    Transaction(String),

    #[error("no ledger record at index {0}")]
    NotFound(u64),

    #[error("lock error")]
    LockError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_types::{build_description, EvidenceMeta};

    fn meta(sha256: &str) -> EvidenceMeta {
        EvidenceMeta {
            sha256: sha256.to_string(),
            case_id: "CASE-001".to_string(),
            ..EvidenceMeta::default()
        }
    }

    #[tokio::test]
    async fn test_submit_and_fetch() {
        let ledger = MemoryLedger::new(PartyId::new("0xabc"));
        let description = build_description(&meta("deadbeef"));

        let tx = ledger.submit("disk image", &description, "Qm1").await.unwrap();
        assert_eq!(tx, "tx-1");
        ledger.submit("phone dump", &description, "Qm2").await.unwrap();

        assert_eq!(ledger.count().await.unwrap(), 2);

        // Rows are 1-indexed.
        let first = ledger.record_at(1).await.unwrap();
        assert_eq!(first.name, "disk image");
        assert!(ledger.record_at(0).await.is_err());
        assert!(ledger.record_at(3).await.is_err());

        let history = fetch_history(&ledger).await.unwrap();
        assert_eq!(history.len(), 2);
        // Newest first.
        assert_eq!(history[0].name, "phone dump");
        assert_eq!(history[0].origin, RecordOrigin::Remote);
        assert_eq!(history[0].state, RecordState::Confirmed);
        assert_eq!(history[1].meta.sha256, "deadbeef");
        assert_eq!(history[1].ledger_ref.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_offline_ledger_surfaces_connectivity() {
        let ledger = MemoryLedger::new(PartyId::new("0xabc"));
        ledger.set_offline(true);
        assert!(matches!(
            ledger.count().await,
            Err(ChainError::Connectivity(_))
        ));
        assert!(matches!(
            fetch_history(&ledger).await,
            Err(ChainError::Connectivity(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_description_yields_empty_meta() {
        let ledger = MemoryLedger::new(PartyId::new("0xabc"));
        ledger
            .seed(ChainRecord {
                id: 1,
                name: "odd row".to_string(),
                description: "not json".to_string(),
                content_ref: "Qm1".to_string(),
                holder: PartyId::new("0xother"),
                timestamp: 1_700_000_000,
            })
            .unwrap();

        let history = fetch_history(&ledger).await.unwrap();
        assert_eq!(history[0].meta, EvidenceMeta::default());
        assert_eq!(history[0].holder, PartyId::new("0xother"));
    }

    #[tokio::test]
    async fn test_content_store_is_content_addressed() {
        let store = MemoryContentStore::new();
        let a = store.put(b"hello").await.unwrap();
        let b = store.put(b"hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.get(&a).unwrap(), b"hello");

        let c = store.put(b"other").await.unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_gateway_url() {
        assert_eq!(
            gateway_url(DEFAULT_CONTENT_GATEWAY, "Qm123"),
            "https://gateway.pinata.cloud/ipfs/Qm123"
        );
        assert_eq!(gateway_url("http://host/ipfs/", "Qm1"), "http://host/ipfs/Qm1");
    }
}
