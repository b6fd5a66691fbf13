//! Audit entries - one logged action each, append-only once written.

use crate::role::Role;
use crate::PartyId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier of an audit entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditEntryId(pub String);

impl AuditEntryId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of sensitive action an audit entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Upload,
    Transfer,
    Verification,
    RoleAssignment,
    RoleChange,
    UserCreated,
    CertificateGenerated,
    ReportGenerated,
    LocalBackup,
    LocalRestore,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "UPLOAD",
            Self::Transfer => "TRANSFER",
            Self::Verification => "VERIFICATION",
            Self::RoleAssignment => "ROLE_ASSIGNMENT",
            Self::RoleChange => "ROLE_CHANGE",
            Self::UserCreated => "USER_CREATED",
            Self::CertificateGenerated => "CERTIFICATE_GENERATED",
            Self::ReportGenerated => "REPORT_GENERATED",
            Self::LocalBackup => "LOCAL_BACKUP",
            Self::LocalRestore => "LOCAL_RESTORE",
        }
    }
}

/// One logged action. Never mutated or removed after creation; storage
/// order is insertion order, newest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub timestamp: DateTime<Utc>,
    pub actor: PartyId,
    /// Human-readable description of the action.
    pub action: String,
    pub action_type: ActionType,
    /// Actor's role at the time of the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_id: Option<String>,
    /// Structured context, e.g. the verification result or record counts.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AuditEntry {
    pub fn new(actor: PartyId, action: impl Into<String>, action_type: ActionType) -> Self {
        Self {
            id: AuditEntryId::generate(),
            timestamp: Utc::now(),
            actor,
            action: action.into(),
            action_type,
            role: None,
            evidence_hash: None,
            evidence_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_role(mut self, role: Option<Role>) -> Self {
        self.role = role;
        self
    }

    pub fn with_evidence_hash(mut self, hash: impl Into<String>) -> Self {
        self.evidence_hash = Some(hash.into());
        self
    }

    pub fn with_evidence_id(mut self, id: impl Into<String>) -> Self {
        self.evidence_id = Some(id.into());
        self
    }

    /// Attach a metadata value. Values that fail to serialize are dropped.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), v);
        }
        self
    }
}
