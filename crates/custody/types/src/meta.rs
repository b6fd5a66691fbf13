//! Evidence metadata and the ledger description codec.
//!
//! The remote ledger stores evidence metadata as a JSON document tagged
//! `"type": "EvidenceMeta"`. Payloads with a different tag, or that fail to
//! parse at all, decode to the empty metadata - never an error.

use serde::{Deserialize, Serialize};

const DESCRIPTION_TAG: &str = "EvidenceMeta";

/// Structured metadata attached to an evidence record. Empty string means
/// the field was not provided.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceMeta {
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub case_id: String,
    #[serde(default)]
    pub investigator: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub notes: String,
}

impl EvidenceMeta {
    /// Whether a content digest was recorded for this evidence.
    pub fn has_digest(&self) -> bool {
        !self.sha256.is_empty()
    }
}

/// Wire form of the description document, including the discriminant tag.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptionDoc {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    sha256: String,
    #[serde(default)]
    case_id: String,
    #[serde(default)]
    investigator: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    notes: String,
}

/// Encode metadata as the tagged description document stored on the ledger.
pub fn build_description(meta: &EvidenceMeta) -> String {
    let doc = DescriptionDoc {
        kind: DESCRIPTION_TAG.to_string(),
        sha256: meta.sha256.clone(),
        case_id: meta.case_id.clone(),
        investigator: meta.investigator.clone(),
        location: meta.location.clone(),
        notes: meta.notes.clone(),
    };
    // Serialization of a plain string/struct document cannot fail.
    serde_json::to_string(&doc).unwrap_or_default()
}

/// Decode a ledger description. Unknown tags and malformed payloads yield
/// the empty metadata.
pub fn parse_description(description: &str) -> EvidenceMeta {
    match serde_json::from_str::<DescriptionDoc>(description) {
        Ok(doc) if doc.kind == DESCRIPTION_TAG => EvidenceMeta {
            sha256: doc.sha256,
            case_id: doc.case_id,
            investigator: doc.investigator,
            location: doc.location,
            notes: doc.notes,
        },
        _ => EvidenceMeta::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_round_trip() {
        let meta = EvidenceMeta {
            sha256: "abc123".to_string(),
            case_id: "CASE-001".to_string(),
            investigator: "J. Doe".to_string(),
            location: "Lat 1.0, Lng 2.0".to_string(),
            notes: "seized at scene".to_string(),
        };

        let encoded = build_description(&meta);
        assert!(encoded.contains("\"type\":\"EvidenceMeta\""));
        assert!(encoded.contains("\"caseId\":\"CASE-001\""));
        assert_eq!(parse_description(&encoded), meta);
    }

    #[test]
    fn test_wrong_tag_yields_empty() {
        let payload = r#"{"type":"SomethingElse","sha256":"abc"}"#;
        assert_eq!(parse_description(payload), EvidenceMeta::default());
    }

    #[test]
    fn test_malformed_payload_yields_empty() {
        assert_eq!(parse_description("not json at all"), EvidenceMeta::default());
        assert_eq!(parse_description(""), EvidenceMeta::default());
        assert_eq!(parse_description("[1,2,3]"), EvidenceMeta::default());
    }

    #[test]
    fn test_missing_fields_default() {
        let payload = r#"{"type":"EvidenceMeta","sha256":"abc"}"#;
        let meta = parse_description(payload);
        assert_eq!(meta.sha256, "abc");
        assert!(meta.case_id.is_empty());
        assert!(meta.notes.is_empty());
    }
}
