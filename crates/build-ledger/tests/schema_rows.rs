//! Serialization tests for the SurrealDB row types.

use build_ledger::{BuildId, ChangeRow};

#[test]
fn test_change_row_serialization_omits_unset_id() {
    let row = ChangeRow::new(42, "foo", "Page", "7");

    let json = serde_json::to_string(&row).expect("Failed to serialize");
    assert!(json.contains("\"build_id\":42"));
    assert!(json.contains("\"destination\":\"foo\""));
    assert!(!json.contains("\"id\""));
}

#[test]
fn test_change_row_into_record() {
    let row = ChangeRow::new(3, "bar", "Article", "x");
    let recorded_at = row.recorded_at;

    let record = row.into_record();
    assert_eq!(record.build_id, BuildId(3));
    assert_eq!(record.destination, "bar");
    assert_eq!(record.entity_type, "Article");
    assert_eq!(record.entity_id, "x");
    assert_eq!(record.recorded_at, recorded_at);
}
