//! Dataset schema versions: immutable, strictly-additive (spec §3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Timestamp,
    Double,
    Integer,
    String,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub nullable: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSchemaVersion {
    pub id: i64,
    pub dataset_id: i64,
    pub version: i32,
    pub fields: Vec<SchemaField>,
    pub created_at: DateTime<Utc>,
}

/// Result of reconciling an incoming field list against the latest version
/// (spec §4.7 step 2).
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaReconciliation {
    /// Field lists are identical; reuse the existing version.
    Unchanged,
    /// New fields were appended; existing fields are untouched.
    Additive { added: Vec<SchemaField> },
    /// An existing field changed type or was removed: incompatible.
    Incompatible { reason: String },
}

/// Compare an incoming field list against the latest schema version's
/// fields by name, per spec §4.7.
pub fn reconcile_fields(existing: &[SchemaField], incoming: &[SchemaField]) -> SchemaReconciliation {
    use std::collections::HashMap;

    let existing_by_name: HashMap<&str, &SchemaField> =
        existing.iter().map(|f| (f.name.as_str(), f)).collect();
    let incoming_by_name: HashMap<&str, &SchemaField> =
        incoming.iter().map(|f| (f.name.as_str(), f)).collect();

    for field in existing {
        match incoming_by_name.get(field.name.as_str()) {
            None => {
                return SchemaReconciliation::Incompatible {
                    reason: format!("field `{}` was removed", field.name),
                }
            }
            Some(incoming_field) => {
                if incoming_field.field_type != field.field_type {
                    return SchemaReconciliation::Incompatible {
                        reason: format!(
                            "field `{}` changed type from {:?} to {:?}",
                            field.name, field.field_type, incoming_field.field_type
                        ),
                    };
                }
            }
        }
    }

    let added: Vec<SchemaField> = incoming
        .iter()
        .filter(|f| !existing_by_name.contains_key(f.name.as_str()))
        .cloned()
        .collect();

    if added.is_empty() {
        SchemaReconciliation::Unchanged
    } else {
        SchemaReconciliation::Additive { added }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, ty: FieldType) -> SchemaField {
        SchemaField { name: name.into(), field_type: ty, nullable: true, description: None }
    }

    #[test]
    fn identical_field_lists_are_unchanged() {
        let a = vec![field("ts", FieldType::Timestamp), field("temp", FieldType::Double)];
        assert_eq!(reconcile_fields(&a, &a), SchemaReconciliation::Unchanged);
    }

    #[test]
    fn appended_field_is_additive() {
        let existing = vec![field("ts", FieldType::Timestamp), field("temp", FieldType::Double)];
        let mut incoming = existing.clone();
        incoming.push(field("wind", FieldType::Double));
        match reconcile_fields(&existing, &incoming) {
            SchemaReconciliation::Additive { added } => {
                assert_eq!(added.len(), 1);
                assert_eq!(added[0].name, "wind");
            }
            other => panic!("expected additive, got {other:?}"),
        }
    }

    #[test]
    fn type_change_is_incompatible() {
        let existing = vec![field("temp", FieldType::Double)];
        let incoming = vec![field("temp", FieldType::String)];
        assert!(matches!(
            reconcile_fields(&existing, &incoming),
            SchemaReconciliation::Incompatible { .. }
        ));
    }

    #[test]
    fn removed_field_is_incompatible() {
        let existing = vec![field("ts", FieldType::Timestamp), field("temp", FieldType::Double)];
        let incoming = vec![field("ts", FieldType::Timestamp)];
        assert!(matches!(
            reconcile_fields(&existing, &incoming),
            SchemaReconciliation::Incompatible { .. }
        ));
    }
}
