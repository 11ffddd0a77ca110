
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::identity::NaturalKey;
use super::{Priority, RecordKind, Zone};

/// One cataloged table or file, shaped for the `DatasetMetadata` collection.
///
/// Structured documents (`detailed_column_info`, `answerable_questions`,
/// `llm_hints`) are kept as JSON text, which is the form the store expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRecord {
    pub table_name: String,
    pub original_file_name: String,
    pub athena_table_name: String,
    pub zone: Zone,
    pub format: String,
    pub description: String,
    pub business_purpose: String,
    pub tags: Vec<String>,
    pub column_semantics_concatenated: String,
    pub columns_array: Vec<String>,
    pub detailed_column_info: String,
    pub record_count: u64,
    pub data_owner: String,
    pub source_system: String,
    pub metadata_created_at: DateTime<Utc>,
    pub data_last_modified_at: DateTime<Utc>,
    pub llm_hints: String,
    pub answerable_questions: String,
}

/// A join path between two datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipRecord {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub relationship_type: String,
    pub cardinality: String,
    pub suggested_join_type: String,
    pub business_meaning: String,
}

/// A business-domain label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainTagRecord {
    pub tag_name: String,
    pub tag_description: String,
    pub business_priority: Priority,
    pub data_sensitivity: String,
}

/// Column description inside `detailedColumnInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub description: String,
}

impl ColumnInfo {
    /// Extract column entries from a column document.
    ///
    /// Accepts `{"columns": [...]}` or a bare array. Array entries may be
    /// objects or plain column names; anything else is skipped.
    #[inline]
    pub fn from_document(document: &Value) -> Vec<ColumnInfo> {
        let entries = match document {
            Value::Array(entries) => entries,
            Value::Object(map) => match map.get("columns") {
                Some(Value::Array(entries)) => entries,
                _ => return Vec::new(),
            },
            _ => return Vec::new(),
        };

        entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(name) => Some(ColumnInfo {
                    name: name.clone(),
                    ..ColumnInfo::default()
                }),
                Value::Object(_) => serde_json::from_value(entry.clone()).ok(),
                _ => None,
            })
            .collect()
    }

    /// Same as [`ColumnInfo::from_document`] for JSON text; invalid JSON yields
    /// no columns.
    #[inline]
    pub fn from_json_text(text: &str) -> Vec<ColumnInfo> {
        serde_json::from_str::<Value>(text)
            .map(|document| Self::from_document(&document))
            .unwrap_or_default()
    }

    /// `name: description` pairs joined with `; `, the format of
    /// `columnSemanticsConcatenated`.
    #[inline]
    pub fn semantics(columns: &[ColumnInfo]) -> String {
        columns
            .iter()
            .filter(|column| !column.name.trim().is_empty())
            .map(|column| {
                if column.description.trim().is_empty() {
                    column.name.clone()
                } else {
                    format!("{}: {}", column.name, column.description)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl DatasetRecord {
    #[inline]
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::dataset(self.table_name.clone(), self.zone)
    }

    #[inline]
    pub fn detailed_columns(&self) -> Vec<ColumnInfo> {
        ColumnInfo::from_json_text(&self.detailed_column_info)
    }
}

impl RelationshipRecord {
    #[inline]
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::relationship(
            self.from_table.clone(),
            self.from_column.clone(),
            self.to_table.clone(),
            self.to_column.clone(),
        )
    }
}

impl DomainTagRecord {
    #[inline]
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::domain_tag(self.tag_name.clone())
    }
}

/// Output of normalization, one variant per record kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedRecord {
    Dataset(DatasetRecord),
    Relationship(RelationshipRecord),
    DomainTag(DomainTagRecord),
}

impl NormalizedRecord {
    #[inline]
    pub const fn kind(&self) -> RecordKind {
        match self {
            NormalizedRecord::Dataset(_) => RecordKind::Dataset,
            NormalizedRecord::Relationship(_) => RecordKind::Relationship,
            NormalizedRecord::DomainTag(_) => RecordKind::DomainTag,
        }
    }

    #[inline]
    pub fn natural_key(&self) -> NaturalKey {
        match self {
            NormalizedRecord::Dataset(record) => record.natural_key(),
            NormalizedRecord::Relationship(record) => record.natural_key(),
            NormalizedRecord::DomainTag(record) => record.natural_key(),
        }
    }

    /// Store properties, keyed by the camelCase field names.
    #[inline]
    pub fn to_properties(&self) -> Map<String, Value> {
        let value = match self {
            NormalizedRecord::Dataset(record) => serde_json::to_value(record),
            NormalizedRecord::Relationship(record) => serde_json::to_value(record),
            NormalizedRecord::DomainTag(record) => serde_json::to_value(record),
        };

        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Size of the serialized properties in bytes.
    #[inline]
    pub fn payload_size(&self) -> usize {
        Value::Object(self.to_properties()).to_string().len()
    }
}
