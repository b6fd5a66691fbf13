//! Custody Timeline - Per-evidence chronological event projection
//!
//! Derives the full chronology of one piece of evidence from two independent
//! sources: the merged record view and the audit trail. The projection is
//! recomputed on every call; nothing is cached.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use custody_types::{build_description, AuditEntry, EventType, EvidenceRecord, PartyId, Role};
use serde::{Deserialize, Serialize};

/// One event on an evidence timeline, projected from either a custody
/// record or an audit entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Record event type or audit action type, in wire form.
    pub event_type: String,
    pub actor: PartyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub details: String,
}

fn record_details(record: &EvidenceRecord) -> String {
    match record.event_type {
        EventType::Upload => build_description(&record.meta),
        EventType::Transfer => match &record.transfer_from {
            Some(from) => format!("Transferred from {} to {}", from.short(), record.holder.short()),
            None => record.name.clone(),
        },
    }
}

/// Build the timeline for one content hash, ascending by timestamp.
///
/// Record events are projected before audit events; for equal timestamps
/// the concatenation order is kept. That tie-break is arbitrary, not
/// semantically meaningful.
pub fn timeline(
    hash: &str,
    records: &[EvidenceRecord],
    audit_entries: &[AuditEntry],
) -> Vec<TimelineEvent> {
    let mut events: Vec<TimelineEvent> = records
        .iter()
        .filter(|r| r.content_ref == hash)
        .map(|r| TimelineEvent {
            id: r.id.clone(),
            timestamp: r.timestamp,
            event_type: r.event_type.as_str().to_string(),
            actor: r.holder.clone(),
            role: r.role,
            details: record_details(r),
        })
        .collect();

    events.extend(
        audit_entries
            .iter()
            .filter(|e| e.evidence_hash.as_deref() == Some(hash))
            .map(|e| TimelineEvent {
                id: e.id.to_string(),
                timestamp: e.timestamp,
                event_type: e.action_type.as_str().to_string(),
                actor: e.actor.clone(),
                role: e.role,
                details: e.action.clone(),
            }),
    );

    // Stable sort: equal timestamps keep concatenation order.
    events.sort_by_key(|e| e.timestamp);
    events
}
