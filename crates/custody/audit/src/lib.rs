//! Custody Audit - Append-only, non-repudiable audit trail
//!
//! Every sensitive action in the custody subsystem writes exactly one entry
//! here. Entries are never mutated or removed; persistence is write-through,
//! so an entry acknowledged by `append` survives a crash or restart.

#![deny(unsafe_code)]

use async_trait::async_trait;
use custody_types::AuditEntry;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info};

/// Storage backend for the audit trail. The persisted document is a JSON
/// array of entries, newest first.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Load the full persisted trail.
    async fn load(&self) -> Result<Vec<AuditEntry>, AuditError>;

    /// Persist the full trail. Must be durable when it returns.
    async fn save(&self, entries: &[AuditEntry]) -> Result<(), AuditError>;
}

/// The append-only audit log. Exposes no remove or update operation.
pub struct AuditLog {
    entries: RwLock<Vec<AuditEntry>>,
    store: Arc<dyn AuditStore>,
}

impl AuditLog {
    /// Open the log, loading any previously persisted entries.
    pub async fn open(store: Arc<dyn AuditStore>) -> Result<Self, AuditError> {
        let entries = store.load().await?;
        info!(entries = entries.len(), "audit log opened");
        Ok(Self {
            entries: RwLock::new(entries),
            store,
        })
    }

    /// Append one entry, newest first. The entry is persisted before it
    /// becomes visible; a persistence failure is fatal to the triggering
    /// action and leaves the log unchanged.
    pub async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let snapshot = {
            let entries = self.entries.read().map_err(|_| AuditError::LockError)?;
            let mut next = Vec::with_capacity(entries.len() + 1);
            next.push(entry);
            next.extend(entries.iter().cloned());
            next
        };

        self.store.save(&snapshot).await?;
        debug!(action_type = ?snapshot[0].action_type, "audit entry appended");

        let mut entries = self.entries.write().map_err(|_| AuditError::LockError)?;
        *entries = snapshot;
        Ok(())
    }

    /// All entries in storage order (newest first).
    pub fn all(&self) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.read().map_err(|_| AuditError::LockError)?;
        Ok(entries.clone())
    }

    /// Entries referencing the given evidence hash, in storage order.
    pub fn by_hash(&self, hash: &str) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.read().map_err(|_| AuditError::LockError)?;
        Ok(entries
            .iter()
            .filter(|e| e.evidence_hash.as_deref() == Some(hash))
            .cloned()
            .collect())
    }

    pub fn len(&self) -> Result<usize, AuditError> {
        let entries = self.entries.read().map_err(|_| AuditError::LockError)?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, AuditError> {
        Ok(self.len()? == 0)
    }
}

/// In-memory store for tests and ephemeral sessions.
pub struct MemoryAuditStore {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn load(&self) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.read().map_err(|_| AuditError::LockError)?;
        Ok(entries.clone())
    }

    async fn save(&self, entries: &[AuditEntry]) -> Result<(), AuditError> {
        let mut stored = self.entries.write().map_err(|_| AuditError::LockError)?;
        *stored = entries.to_vec();
        Ok(())
    }
}

/// File-backed store: one JSON array document, newest first, rewritten on
/// every append.
pub struct JsonFileAuditStore {
    path: PathBuf,
}

impl JsonFileAuditStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl AuditStore for JsonFileAuditStore {
    async fn load(&self) -> Result<Vec<AuditEntry>, AuditError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = tokio::fs::read_to_string(&self.path).await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn save(&self, entries: &[AuditEntry]) -> Result<(), AuditError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string(entries)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

/// Audit-trail errors.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("lock error")]
    LockError,

    #[error("audit store error: {0}")]
    Store(String),
}
