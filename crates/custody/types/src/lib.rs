//! Custody Types - Shared data model for evidence chain-of-custody
//!
//! Every component of the custody subsystem speaks in these types: evidence
//! records, audit entries, roles, and the tolerant description codec used on
//! the remote ledger.

#![deny(unsafe_code)]

pub mod audit;
pub mod meta;
pub mod record;
pub mod role;

pub use audit::{ActionType, AuditEntry, AuditEntryId};
pub use meta::{build_description, parse_description, EvidenceMeta};
pub use record::{EventType, EvidenceRecord, RecordOrigin, RecordState};
pub use role::{ParseRoleError, Role};

use serde::{Deserialize, Serialize};

/// Identity of a party in the custody chain (wallet address or equivalent).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyId(pub String);

impl PartyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display and audit text, e.g. `0x12ab34...`.
    pub fn short(&self) -> String {
        match self.0.get(..10) {
            Some(prefix) if self.0.len() > 10 => format!("{prefix}..."),
            _ => self.0.clone(),
        }
    }
}

impl std::fmt::Display for PartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of an integrity verification attempt. Closed set; every outcome,
/// success or failure, is recorded in the audit trail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationOutcome {
    /// No record exists for the given hash or id.
    NotFound,
    /// A record exists but carries no stored digest.
    MissingDigest,
    Match,
    Mismatch,
    /// I/O or computation failure while verifying.
    Error,
}

impl VerificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::MissingDigest => "MISSING_DIGEST",
            Self::Match => "MATCH",
            Self::Mismatch => "MISMATCH",
            Self::Error => "ERROR",
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

impl std::fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
