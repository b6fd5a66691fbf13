//! Filtering over the merged evidence view.

use chrono::NaiveDate;
use custody_types::{EvidenceRecord, PartyId, Role};
use std::collections::HashMap;

/// Composable filter over evidence records. All set predicates must hold
/// for a record to match.
#[derive(Clone, Debug, Default)]
pub struct RecordQuery {
    /// Case-insensitive substring matched against hash, name, case id,
    /// investigator, location, and notes; any one field matching suffices.
    pub text: Option<String>,

    /// Case-insensitive substring restricted to the case id field.
    pub case_id: Option<String>,

    /// Exact match against the record's resolved role.
    pub role: Option<Role>,

    /// Inclusive lower bound, from 00:00:00 of this day.
    pub start_date: Option<NaiveDate>,

    /// Inclusive upper bound, through 23:59:59.999 of this day.
    pub end_date: Option<NaiveDate>,
}

impl RecordQuery {
    pub fn builder() -> RecordQueryBuilder {
        RecordQueryBuilder::default()
    }

    /// Check one record. `resolved_role` is the record's own role when
    /// present, otherwise the role currently assigned to its holder.
    pub fn matches(&self, record: &EvidenceRecord, resolved_role: Option<Role>) -> bool {
        if let Some(ref term) = self.text {
            let term = term.to_lowercase();
            let fields = [
                &record.content_ref,
                &record.name,
                &record.meta.case_id,
                &record.meta.investigator,
                &record.meta.location,
                &record.meta.notes,
            ];
            if !fields.iter().any(|f| f.to_lowercase().contains(&term)) {
                return false;
            }
        }

        if let Some(ref case_id) = self.case_id {
            if !record
                .meta
                .case_id
                .to_lowercase()
                .contains(&case_id.to_lowercase())
            {
                return false;
            }
        }

        if let Some(role) = self.role {
            if resolved_role != Some(role) {
                return false;
            }
        }

        if let Some(start) = self.start_date {
            let bound = start.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
            match bound {
                Some(bound) if record.timestamp >= bound => {}
                _ => return false,
            }
        }

        if let Some(end) = self.end_date {
            let bound = end.and_hms_milli_opt(23, 59, 59, 999).map(|t| t.and_utc());
            match bound {
                Some(bound) if record.timestamp <= bound => {}
                _ => return false,
            }
        }

        true
    }

    /// Filter a view, resolving roles through the given role map and
    /// preserving the view's order.
    pub fn apply(
        &self,
        view: &[EvidenceRecord],
        roles: &HashMap<PartyId, Role>,
    ) -> Vec<EvidenceRecord> {
        view.iter()
            .filter(|record| {
                let resolved = record.role.or_else(|| roles.get(&record.holder).copied());
                self.matches(record, resolved)
            })
            .cloned()
            .collect()
    }
}

/// Builder for [`RecordQuery`].
#[derive(Debug, Default)]
pub struct RecordQueryBuilder {
    query: RecordQuery,
}

impl RecordQueryBuilder {
    pub fn text(mut self, term: impl Into<String>) -> Self {
        self.query.text = Some(term.into());
        self
    }

    pub fn case_id(mut self, case_id: impl Into<String>) -> Self {
        self.query.case_id = Some(case_id.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.query.role = Some(role);
        self
    }

    pub fn start_date(mut self, date: NaiveDate) -> Self {
        self.query.start_date = Some(date);
        self
    }

    pub fn end_date(mut self, date: NaiveDate) -> Self {
        self.query.end_date = Some(date);
        self
    }

    pub fn build(self) -> RecordQuery {
        self.query
    }
}
