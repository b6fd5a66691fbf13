//! Custody Store - Merged evidence view, local cache, and queries
//!
//! Reconciles the authoritative remote record set with the locally cached
//! pending set into one queryable view. Local records are written through to
//! a per-identity cache document and survive restarts; remote records are
//! refreshed from the ledger and held in memory only.

#![deny(unsafe_code)]

pub mod backup;
pub mod query;

pub use backup::{export_backup, parse_backup, BackupDocument, RestoredBackup, BACKUP_VERSION};
pub use query::{RecordQuery, RecordQueryBuilder};

use async_trait::async_trait;
use custody_types::{EvidenceRecord, PartyId, RecordState};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info};

/// Merge the two record sets into the canonical view: all local-pending
/// records (most recent first) followed by all remote records (most recent
/// first). Nothing is deduplicated here; a pending record and its confirmed
/// remote counterpart may coexist until `RecordStore::reconcile` runs.
pub fn merge(remote: &[EvidenceRecord], local: &[EvidenceRecord]) -> Vec<EvidenceRecord> {
    let mut view = Vec::with_capacity(local.len() + remote.len());

    let mut locals: Vec<EvidenceRecord> = local.to_vec();
    locals.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    view.extend(locals);

    let mut remotes: Vec<EvidenceRecord> = remote.to_vec();
    remotes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    view.extend(remotes);

    view
}

/// Storage backend for the local evidence cache: one JSON array document per
/// identity, with a global fallback document for sessions without one.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self, identity: Option<&PartyId>) -> Result<Vec<EvidenceRecord>, StoreError>;
    async fn save(
        &self,
        identity: Option<&PartyId>,
        records: &[EvidenceRecord],
    ) -> Result<(), StoreError>;
}

const GLOBAL_CACHE_KEY: &str = "evidence_history_global";

fn cache_key(identity: Option<&PartyId>) -> String {
    match identity {
        Some(id) => format!("evidence_history_{id}"),
        None => GLOBAL_CACHE_KEY.to_string(),
    }
}

/// In-memory cache store for tests and ephemeral sessions.
pub struct MemoryCacheStore {
    documents: RwLock<HashMap<String, Vec<EvidenceRecord>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load(&self, identity: Option<&PartyId>) -> Result<Vec<EvidenceRecord>, StoreError> {
        let documents = self.documents.read().map_err(|_| StoreError::LockError)?;
        if let Some(records) = documents.get(&cache_key(identity)) {
            return Ok(records.clone());
        }
        // Fall back to the global document for identities with no cache yet.
        Ok(documents.get(GLOBAL_CACHE_KEY).cloned().unwrap_or_default())
    }

    async fn save(
        &self,
        identity: Option<&PartyId>,
        records: &[EvidenceRecord],
    ) -> Result<(), StoreError> {
        let mut documents = self.documents.write().map_err(|_| StoreError::LockError)?;
        documents.insert(cache_key(identity), records.to_vec());
        Ok(())
    }
}

/// Directory-backed cache store: `<dir>/<cache key>.json` per identity.
pub struct JsonDirCacheStore {
    dir: PathBuf,
}

impl JsonDirCacheStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    async fn read_document(&self, key: &str) -> Result<Option<Vec<EvidenceRecord>>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let text = tokio::fs::read_to_string(&path).await?;
        if text.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }
        Ok(Some(serde_json::from_str(&text)?))
    }
}

#[async_trait]
impl CacheStore for JsonDirCacheStore {
    async fn load(&self, identity: Option<&PartyId>) -> Result<Vec<EvidenceRecord>, StoreError> {
        if let Some(records) = self.read_document(&cache_key(identity)).await? {
            return Ok(records);
        }
        Ok(self
            .read_document(GLOBAL_CACHE_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn save(
        &self,
        identity: Option<&PartyId>,
        records: &[EvidenceRecord],
    ) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string(records)?;
        tokio::fs::write(self.path_for(&cache_key(identity)), json).await?;
        Ok(())
    }
}

/// Holds both record sets and answers queries over the merged view.
///
/// Local records are authoritative until confirmed; remote records are
/// authoritative for digest and confirmation status.
pub struct RecordStore {
    identity: Option<PartyId>,
    local: RwLock<Vec<EvidenceRecord>>,
    remote: RwLock<Vec<EvidenceRecord>>,
    cache: Arc<dyn CacheStore>,
}

impl RecordStore {
    /// Open the store, loading the cached local set for this identity.
    pub async fn open(
        cache: Arc<dyn CacheStore>,
        identity: Option<PartyId>,
    ) -> Result<Self, StoreError> {
        let local = cache.load(identity.as_ref()).await?;
        info!(records = local.len(), "local evidence cache loaded");
        Ok(Self {
            identity,
            local: RwLock::new(local),
            remote: RwLock::new(Vec::new()),
            cache,
        })
    }

    /// Replace the remote set with a freshly fetched history.
    pub fn set_remote(&self, records: Vec<EvidenceRecord>) -> Result<(), StoreError> {
        let mut remote = self.remote.write().map_err(|_| StoreError::LockError)?;
        *remote = records;
        Ok(())
    }

    /// Prepend one local record and write the cache through.
    pub async fn insert_local(&self, record: EvidenceRecord) -> Result<(), StoreError> {
        let snapshot = {
            let local = self.local.read().map_err(|_| StoreError::LockError)?;
            let mut next = Vec::with_capacity(local.len() + 1);
            next.push(record);
            next.extend(local.iter().cloned());
            next
        };
        self.cache.save(self.identity.as_ref(), &snapshot).await?;
        let mut local = self.local.write().map_err(|_| StoreError::LockError)?;
        *local = snapshot;
        Ok(())
    }

    /// Replace the entire local set (restore path) and write through.
    pub async fn replace_local(&self, records: Vec<EvidenceRecord>) -> Result<(), StoreError> {
        self.cache.save(self.identity.as_ref(), &records).await?;
        let mut local = self.local.write().map_err(|_| StoreError::LockError)?;
        *local = records;
        Ok(())
    }

    pub fn local_records(&self) -> Result<Vec<EvidenceRecord>, StoreError> {
        let local = self.local.read().map_err(|_| StoreError::LockError)?;
        Ok(local.clone())
    }

    pub fn remote_records(&self) -> Result<Vec<EvidenceRecord>, StoreError> {
        let remote = self.remote.read().map_err(|_| StoreError::LockError)?;
        Ok(remote.clone())
    }

    /// The canonical merged view.
    pub fn merged(&self) -> Result<Vec<EvidenceRecord>, StoreError> {
        let local = self.local.read().map_err(|_| StoreError::LockError)?;
        let remote = self.remote.read().map_err(|_| StoreError::LockError)?;
        Ok(merge(&remote, &local))
    }

    /// First record in the merged view with the given content hash. A
    /// pending local record shadows a not-yet-visible remote one.
    pub fn by_hash(&self, hash: &str) -> Result<Option<EvidenceRecord>, StoreError> {
        Ok(self
            .merged()?
            .into_iter()
            .find(|r| r.content_ref == hash))
    }

    /// First record in the merged view with the given id.
    pub fn by_id(&self, id: &str) -> Result<Option<EvidenceRecord>, StoreError> {
        Ok(self.merged()?.into_iter().find(|r| r.id == id))
    }

    /// Match local pending records against their confirmed remote
    /// counterparts by the stable key `(content_ref, holder, event_type)` -
    /// never by id, since ids are assigned independently by each origin.
    /// Matched records become Confirmed and take the remote ledger ref; the
    /// local record itself is kept. Returns how many were confirmed.
    pub async fn reconcile(&self) -> Result<usize, StoreError> {
        let remote = self.remote_records()?;
        let (snapshot, confirmed) = {
            let local = self.local.read().map_err(|_| StoreError::LockError)?;
            let mut next = local.clone();
            let mut confirmed = 0usize;
            for record in next.iter_mut() {
                if record.state != RecordState::Pending {
                    continue;
                }
                let counterpart = remote
                    .iter()
                    .find(|r| r.reconciliation_key() == record.reconciliation_key());
                if let Some(remote_record) = counterpart {
                    record.state = RecordState::Confirmed;
                    record.ledger_ref = remote_record.ledger_ref.clone();
                    confirmed += 1;
                }
            }
            (next, confirmed)
        };
        if confirmed == 0 {
            return Ok(0);
        }
        debug!(confirmed, "reconciled pending records");
        self.cache.save(self.identity.as_ref(), &snapshot).await?;
        let mut local = self.local.write().map_err(|_| StoreError::LockError)?;
        *local = snapshot;
        Ok(confirmed)
    }

    /// Mark a pending local record as failed. The timeout policy that
    /// decides when to call this belongs to the caller.
    pub async fn mark_failed(&self, id: &str) -> Result<(), StoreError> {
        let snapshot = {
            let local = self.local.read().map_err(|_| StoreError::LockError)?;
            let mut next = local.clone();
            let record = next
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            if record.state != RecordState::Pending {
                return Err(StoreError::NotPending(id.to_string()));
            }
            record.state = RecordState::Failed;
            next
        };
        self.cache.save(self.identity.as_ref(), &snapshot).await?;
        let mut local = self.local.write().map_err(|_| StoreError::LockError)?;
        *local = snapshot;
        Ok(())
    }
}

/// Store-level errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed backup payload: {0}")]
    Format(String),

    #[error("no record with id {0}")]
    NotFound(String),

    #[error("record {0} is not pending")]
    NotPending(String),

    #[error("lock error")]
    LockError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use custody_types::{EventType, EvidenceMeta, RecordOrigin};

    fn record(
        id: &str,
        content_ref: &str,
        origin: RecordOrigin,
        minutes_ago: i64,
    ) -> EvidenceRecord {
        EvidenceRecord {
            id: id.to_string(),
            name: format!("evidence {id}"),
            meta: EvidenceMeta::default(),
            content_ref: content_ref.to_string(),
            holder: PartyId::new("0xabc"),
            event_type: EventType::Upload,
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            origin,
            ledger_ref: match origin {
                RecordOrigin::Remote => Some(id.to_string()),
                RecordOrigin::LocalPending => None,
            },
            state: match origin {
                RecordOrigin::Remote => RecordState::Confirmed,
                RecordOrigin::LocalPending => RecordState::Pending,
            },
            role: None,
            transfer_from: None,
        }
    }

    #[test]
    fn test_merge_order_local_first_then_remote() {
        let remote = vec![
            record("r1", "QmR1", RecordOrigin::Remote, 60),
            record("r2", "QmR2", RecordOrigin::Remote, 10),
        ];
        let local = vec![
            record("l1", "QmL1", RecordOrigin::LocalPending, 30),
            record("l2", "QmL2", RecordOrigin::LocalPending, 5),
        ];

        let view = merge(&remote, &local);
        let ids: Vec<&str> = view.iter().map(|r| r.id.as_str()).collect();
        // Locals most-recent-first, then remotes most-recent-first.
        assert_eq!(ids, vec!["l2", "l1", "r2", "r1"]);
    }

    #[tokio::test]
    async fn test_pending_record_shadows_remote_on_lookup() {
        let store = RecordStore::open(Arc::new(MemoryCacheStore::new()), None)
            .await
            .unwrap();
        let mut local = record("l1", "QmSame", RecordOrigin::LocalPending, 5);
        local.holder = PartyId::new("0xlocal");
        store.insert_local(local).await.unwrap();
        let mut remote = record("r1", "QmSame", RecordOrigin::Remote, 60);
        remote.holder = PartyId::new("0xremote");
        store.set_remote(vec![remote]).unwrap();

        let hit = store.by_hash("QmSame").unwrap().unwrap();
        assert_eq!(hit.origin, RecordOrigin::LocalPending);
        assert_eq!(hit.holder, PartyId::new("0xlocal"));
    }

    #[tokio::test]
    async fn test_reconcile_matches_by_key_not_id() {
        let store = RecordStore::open(Arc::new(MemoryCacheStore::new()), None)
            .await
            .unwrap();
        store
            .insert_local(record("local-123", "QmX", RecordOrigin::LocalPending, 5))
            .await
            .unwrap();
        // Remote counterpart carries a completely different id.
        store
            .set_remote(vec![record("42", "QmX", RecordOrigin::Remote, 3)])
            .unwrap();

        let confirmed = store.reconcile().await.unwrap();
        assert_eq!(confirmed, 1);

        let local = store.local_records().unwrap();
        assert_eq!(local[0].state, RecordState::Confirmed);
        assert_eq!(local[0].ledger_ref.as_deref(), Some("42"));
        // The local record is kept, not removed.
        assert_eq!(store.merged().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_ignores_different_holder() {
        let store = RecordStore::open(Arc::new(MemoryCacheStore::new()), None)
            .await
            .unwrap();
        let mut pending = record("l1", "QmX", RecordOrigin::LocalPending, 5);
        pending.holder = PartyId::new("0xother");
        store.insert_local(pending).await.unwrap();
        store
            .set_remote(vec![record("1", "QmX", RecordOrigin::Remote, 3)])
            .unwrap();

        assert_eq!(store.reconcile().await.unwrap(), 0);
        assert_eq!(store.local_records().unwrap()[0].state, RecordState::Pending);
    }

    #[tokio::test]
    async fn test_mark_failed() {
        let store = RecordStore::open(Arc::new(MemoryCacheStore::new()), None)
            .await
            .unwrap();
        store
            .insert_local(record("l1", "QmX", RecordOrigin::LocalPending, 5))
            .await
            .unwrap();

        store.mark_failed("l1").await.unwrap();
        assert_eq!(store.local_records().unwrap()[0].state, RecordState::Failed);

        // A failed record cannot fail twice.
        assert!(matches!(
            store.mark_failed("l1").await,
            Err(StoreError::NotPending(_))
        ));
        assert!(matches!(
            store.mark_failed("missing").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cache_round_trip_per_identity() {
        let dir = tempfile::tempdir().unwrap();
        let identity = PartyId::new("0xalice");

        {
            let cache = Arc::new(JsonDirCacheStore::new(dir.path().to_path_buf()));
            let store = RecordStore::open(cache, Some(identity.clone())).await.unwrap();
            store
                .insert_local(record("l1", "QmX", RecordOrigin::LocalPending, 5))
                .await
                .unwrap();
        }

        let cache = Arc::new(JsonDirCacheStore::new(dir.path().to_path_buf()));
        let store = RecordStore::open(cache.clone(), Some(identity)).await.unwrap();
        assert_eq!(store.local_records().unwrap().len(), 1);

        // A different identity starts from the global fallback (empty here).
        let other = RecordStore::open(cache, Some(PartyId::new("0xbob")))
            .await
            .unwrap();
        assert!(other.local_records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_global_fallback_cache() {
        let cache = Arc::new(MemoryCacheStore::new());
        cache
            .save(None, &[record("g1", "QmG", RecordOrigin::LocalPending, 5)])
            .await
            .unwrap();

        // An identity with no cache of its own reads the global document.
        let store = RecordStore::open(cache, Some(PartyId::new("0xnew")))
            .await
            .unwrap();
        assert_eq!(store.local_records().unwrap().len(), 1);
    }
}
