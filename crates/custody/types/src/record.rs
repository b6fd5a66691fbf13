//! Evidence records - one custody event each.

use crate::meta::EvidenceMeta;
use crate::role::Role;
use crate::PartyId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of custody event a record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Upload,
    Transfer,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "UPLOAD",
            Self::Transfer => "TRANSFER",
        }
    }
}

/// Which source a record came from.
///
/// Remote records are authoritative for digest and confirmation status;
/// local records are authoritative only until confirmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordOrigin {
    Remote,
    LocalPending,
}

/// Confirmation state of a record against the remote ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordState {
    /// Written locally, not yet acknowledged by the ledger.
    Pending,
    /// Acknowledged by the ledger.
    Confirmed,
    /// Acknowledgment never arrived; marked by the caller's timeout policy.
    Failed,
}

/// One custody event: an upload establishing evidence, or a transfer of
/// possession. The digest inside `meta`, once set, is never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRecord {
    /// Unique within its origin; cross-origin identity is the
    /// reconciliation key `(content_ref, holder, event_type)`.
    pub id: String,
    /// Display label.
    pub name: String,
    #[serde(default)]
    pub meta: EvidenceMeta,
    /// Opaque content-store identifier (content address).
    pub content_ref: String,
    /// Identity currently possessing the evidence.
    pub holder: PartyId,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub origin: RecordOrigin,
    /// Reference to the confirming remote transaction; `None` while the
    /// record is local-pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_ref: Option<String>,
    pub state: RecordState,
    /// Role of the acting holder at record time, when known locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Previous holder, present on transfer records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_from: Option<PartyId>,
}

impl EvidenceRecord {
    /// Stable identity across origins. Record ids are assigned
    /// independently by each origin and must not be used for matching.
    pub fn reconciliation_key(&self) -> (&str, &PartyId, EventType) {
        (&self.content_ref, &self.holder, self.event_type)
    }

    pub fn is_pending(&self) -> bool {
        self.state == RecordState::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(content_ref: &str, holder: &str) -> EvidenceRecord {
        EvidenceRecord {
            id: "1".to_string(),
            name: "disk image".to_string(),
            meta: EvidenceMeta::default(),
            content_ref: content_ref.to_string(),
            holder: PartyId::new(holder),
            event_type: EventType::Upload,
            timestamp: Utc::now(),
            origin: RecordOrigin::LocalPending,
            ledger_ref: None,
            state: RecordState::Pending,
            role: None,
            transfer_from: None,
        }
    }

    #[test]
    fn test_reconciliation_key_ignores_id() {
        let a = record("Qm123", "0xabc");
        let mut b = record("Qm123", "0xabc");
        b.id = "999".to_string();
        assert_eq!(a.reconciliation_key(), b.reconciliation_key());

        let c = record("Qm456", "0xabc");
        assert_ne!(a.reconciliation_key(), c.reconciliation_key());
    }

    #[test]
    fn test_record_serde_camel_case() {
        let rec = record("Qm123", "0xabc");
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"contentRef\":\"Qm123\""));
        assert!(json.contains("\"eventType\":\"UPLOAD\""));
        assert!(json.contains("\"origin\":\"LOCAL_PENDING\""));
        // Absent options are omitted from persisted documents.
        assert!(!json.contains("ledgerRef"));

        let back: EvidenceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }
}
