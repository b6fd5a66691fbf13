//! Custody Certificate - Proof-of-existence artifacts
//!
//! Derives a human-readable certificate from a resolved evidence record.
//! The certificate is descriptive: it asserts provenance based on ledger
//! data that was already verified, and is not itself tamper-proof beyond
//! what the underlying digest and ledger guarantee.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use custody_types::EvidenceRecord;
use serde::{Deserialize, Serialize};

pub const CERTIFICATE_TITLE: &str = "PROOF OF EXISTENCE (PoE) VERIFICATION CERTIFICATE";

pub const NON_REPUDIATION_TEXT: &str = "This certificate serves as cryptographic proof of \
existence, ownership, and integrity of the evidence. The investigator wallet address and \
digital signatures create an immutable, non-repudiable record suitable for legal proceedings.";

pub const LEGAL_DISCLAIMER: &str = "This Proof of Existence Certificate is issued as a formal \
record of evidence chain of custody for investigative and legal purposes. The ledger timestamp \
and cryptographic hashes provide non-repudiation and tamper-evident proof.";

/// A rendered proof-of-existence certificate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// Derived deterministically from the issuance instant.
    pub certificate_number: String,
    pub generated_at: DateTime<Utc>,
    pub title: String,
    pub evidence_name: String,
    pub record_id: String,
    pub holder: String,
    pub sha256: String,
    pub content_ref: String,
    pub record_timestamp: DateTime<Utc>,
    pub case_id: String,
    pub investigator: String,
    pub location: String,
    pub notes: String,
    pub verification_status: String,
    pub non_repudiation_text: String,
    pub legal_disclaimer: String,
}

fn or_na(value: &str) -> String {
    if value.is_empty() {
        "N/A".to_string()
    } else {
        value.to_string()
    }
}

/// Issue a certificate for a resolved record. The certificate number is the
/// last ten digits of the issuance unix-millisecond timestamp, prefixed
/// `POE-`; issuing twice at the same instant yields the same number.
pub fn issue(record: &EvidenceRecord, issued_at: DateTime<Utc>) -> Certificate {
    let millis = issued_at.timestamp_millis().to_string();
    let tail = if millis.len() > 10 {
        millis[millis.len() - 10..].to_string()
    } else {
        millis
    };

    Certificate {
        certificate_number: format!("POE-{tail}"),
        generated_at: issued_at,
        title: CERTIFICATE_TITLE.to_string(),
        evidence_name: record.name.clone(),
        record_id: record.id.clone(),
        holder: record.holder.to_string(),
        sha256: if record.meta.has_digest() {
            record.meta.sha256.clone()
        } else {
            "Not Available".to_string()
        },
        content_ref: record.content_ref.clone(),
        record_timestamp: record.timestamp,
        case_id: or_na(&record.meta.case_id),
        investigator: or_na(&record.meta.investigator),
        location: or_na(&record.meta.location),
        notes: or_na(&record.meta.notes),
        verification_status: "VERIFIED".to_string(),
        non_repudiation_text: NON_REPUDIATION_TEXT.to_string(),
        legal_disclaimer: LEGAL_DISCLAIMER.to_string(),
    }
}

impl Certificate {
    /// Render the certificate as a plain-text document.
    pub fn render(&self) -> String {
        let rule = "─".repeat(79);
        format!(
            "\
{title}

CERTIFICATE NUMBER:        {number}
GENERATED:                 {generated}
VERIFICATION STATUS:       {status}

{rule}

EVIDENCE DETAILS:

  Evidence Name:           {name}
  Record ID:               {id}
  Case ID:                 {case_id}
  Investigator Name:       {investigator}
  Investigation Location:  {location}

{rule}

CRYPTOGRAPHIC VERIFICATION:

  SHA-256 Hash:            {sha256}
  Content Address:         {content_ref}
  Holder:                  {holder}
  Ledger Timestamp:        {record_ts}

{rule}

NOTES AND OBSERVATIONS:
{notes}

{rule}

NON-REPUDIATION DECLARATION:

{non_repudiation}

{rule}

LEGAL DISCLAIMER:

{disclaimer}

This certificate is generated as an automated record and should be used in
conjunction with supporting documentation and chain of custody procedures.
",
            title = self.title,
            number = self.certificate_number,
            generated = self.generated_at.to_rfc3339(),
            status = self.verification_status,
            rule = rule,
            name = self.evidence_name,
            id = self.record_id,
            case_id = self.case_id,
            investigator = self.investigator,
            location = self.location,
            sha256 = self.sha256,
            content_ref = self.content_ref,
            holder = self.holder,
            record_ts = self.record_timestamp.to_rfc3339(),
            notes = self.notes,
            non_repudiation = self.non_repudiation_text,
            disclaimer = self.legal_disclaimer,
        )
    }
}
