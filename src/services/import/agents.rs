//! Agent roster import mapping

use crate::types::{AgentRecord, AgentStatus, RecordError, DEFAULT_GROUP};

use super::normalize::{FieldMap, FieldSpec, Schema};
use super::store::ImportRecord;
use super::Importable;

const AGENT_FIELDS: &[FieldSpec] = &[
    FieldSpec::key_text("name", &["Agent Name", "name", "Name"]),
    FieldSpec::text("gruppe", &["Gruppe", "gruppe", "Group"], DEFAULT_GROUP),
    // absent status means active on import; any value other than "aktiv" is off
    FieldSpec::flag("status", &["Status", "status"], "aktiv", "off", true),
];

pub const AGENT_SCHEMA: Schema = Schema {
    kind: "agents",
    fields: AGENT_FIELDS,
};

impl ImportRecord for AgentRecord {
    type Key = String;

    fn natural_key(&self) -> String {
        self.name().to_string()
    }

    fn same_content(&self, other: &Self) -> bool {
        self.gruppe() == other.gruppe() && self.status() == other.status()
    }
}

impl Importable for AgentRecord {
    const SCHEMA: &'static Schema = &AGENT_SCHEMA;

    fn from_fields(fields: &FieldMap) -> Result<Self, RecordError> {
        AgentRecord::new(
            fields.text("name")?,
            fields.text("gruppe")?,
            AgentStatus::from_active(fields.flag("status")?),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::import::normalize::normalize_row;
    use crate::types::ImportRow;
    use chrono::NaiveDate;

    fn record(row: ImportRow) -> Result<AgentRecord, RecordError> {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let normalized = normalize_row(&row, &AGENT_SCHEMA, today);
        AgentRecord::from_fields(&normalized.fields)
    }

    #[test]
    fn test_header_variants_map_to_same_record() {
        let a = record(ImportRow::new(2).with("Agent Name", "Alice").with("Gruppe", "EN").with("Status", "aktiv")).unwrap();
        let b = record(ImportRow::new(2).with("name", "Alice").with("Group", "EN").with("status", "Aktiv")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.status(), AgentStatus::Active);
    }

    #[test]
    fn test_missing_group_defaults_to_de_and_missing_status_to_active() {
        let a = record(ImportRow::new(2).with("Name", "Bob")).unwrap();
        assert_eq!(a.gruppe(), "DE");
        assert_eq!(a.status(), AgentStatus::Active);
    }

    #[test]
    fn test_non_aktiv_status_is_inactive() {
        let a = record(ImportRow::new(2).with("Name", "Bob").with("Status", "krank")).unwrap();
        assert_eq!(a.status(), AgentStatus::Inactive);
    }

    #[test]
    fn test_same_content_ignores_key() {
        let a = AgentRecord::new("Alice", "DE", AgentStatus::Active).unwrap();
        let b = AgentRecord::new("Alice", "EN", AgentStatus::Active).unwrap();
        assert!(!a.same_content(&b));
        assert!(a.same_content(&a.clone()));
    }
}
