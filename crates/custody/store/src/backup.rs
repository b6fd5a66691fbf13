//! Backup and restore of the local evidence cache.
//!
//! The backup file is a JSON object wrapping the cached records; a bare JSON
//! array of records is also accepted as the legacy form. Restoring replaces
//! the entire local cache for the current identity - it is not a merge.

use crate::StoreError;
use chrono::{DateTime, Utc};
use custody_types::{EvidenceRecord, PartyId};
use serde::{Deserialize, Serialize};

pub const BACKUP_VERSION: u32 = 1;

/// Versioned backup document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub version: u32,
    /// ISO-8601 export instant.
    pub exported_at: String,
    pub wallet_address: Option<PartyId>,
    pub local_history: Vec<EvidenceRecord>,
}

/// Result of parsing a backup payload.
#[derive(Clone, Debug)]
pub struct RestoredBackup {
    pub records: Vec<EvidenceRecord>,
    /// Identity the backup was exported for, when the payload carries one.
    pub source_wallet: Option<PartyId>,
}

/// Serialize the local history as a backup document.
pub fn export_backup(
    wallet: Option<&PartyId>,
    records: &[EvidenceRecord],
    exported_at: DateTime<Utc>,
) -> Result<String, StoreError> {
    let document = BackupDocument {
        version: BACKUP_VERSION,
        exported_at: exported_at.to_rfc3339(),
        wallet_address: wallet.cloned(),
        local_history: records.to_vec(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Parse a backup payload, accepting both the versioned document and the
/// legacy bare array form.
pub fn parse_backup(text: &str) -> Result<RestoredBackup, StoreError> {
    if let Ok(document) = serde_json::from_str::<BackupDocument>(text) {
        return Ok(RestoredBackup {
            records: document.local_history,
            source_wallet: document.wallet_address,
        });
    }
    if let Ok(records) = serde_json::from_str::<Vec<EvidenceRecord>>(text) {
        return Ok(RestoredBackup {
            records,
            source_wallet: None,
        });
    }
    Err(StoreError::Format(
        "not a backup document or record array".to_string(),
    ))
}
