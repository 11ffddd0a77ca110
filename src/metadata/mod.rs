//! Catalog metadata: record kinds, raw input, validation, normalization and
//! deterministic identifiers.
//!
//! Raw descriptors arrive as loosely-typed mappings ([`RawMetadata`]).
//! [`validate`] reports every problem with a raw mapping, and a [`Normalizer`]
//! turns a raw mapping into one of the typed records in [`records`]. That
//! conversion is the only place where untyped input becomes typed data.


pub mod identity;
pub mod normalize;
pub mod records;
pub mod validate;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub use identity::{IDENTIFIER_NAMESPACE, NaturalKey, identifier_for, identifier_for_canonical};
pub use normalize::{ELLIPSIS, Normalizer, Profile, SizeLimits, truncate_tags, truncate_text};
pub use records::{ColumnInfo, DatasetRecord, DomainTagRecord, NormalizedRecord, RelationshipRecord};
pub use validate::{Validation, validate};

/// Field names as they are stored in the vector store.
pub mod fields {
    pub const TABLE_NAME: &str = "tableName";
    pub const ZONE: &str = "zone";
    pub const ORIGINAL_FILE_NAME: &str = "originalFileName";
    pub const ATHENA_TABLE_NAME: &str = "athenaTableName";
    pub const FORMAT: &str = "format";
    pub const DESCRIPTION: &str = "description";
    pub const BUSINESS_PURPOSE: &str = "businessPurpose";
    pub const DATA_OWNER: &str = "dataOwner";
    pub const SOURCE_SYSTEM: &str = "sourceSystem";
    pub const COLUMNS_ARRAY: &str = "columnsArray";
    pub const DETAILED_COLUMN_INFO: &str = "detailedColumnInfo";
    pub const RECORD_COUNT: &str = "recordCount";
    pub const COLUMN_SEMANTICS: &str = "columnSemanticsConcatenated";
    pub const TAGS: &str = "tags";
    pub const ANSWERABLE_QUESTIONS: &str = "answerableQuestions";
    pub const LLM_HINTS: &str = "llmHints";
    pub const METADATA_CREATED_AT: &str = "metadataCreatedAt";
    pub const DATA_LAST_MODIFIED_AT: &str = "dataLastModifiedAt";

    pub const FROM_TABLE: &str = "fromTable";
    pub const FROM_COLUMN: &str = "fromColumn";
    pub const TO_TABLE: &str = "toTable";
    pub const TO_COLUMN: &str = "toColumn";
    pub const RELATIONSHIP_TYPE: &str = "relationshipType";
    pub const CARDINALITY: &str = "cardinality";
    pub const SUGGESTED_JOIN_TYPE: &str = "suggestedJoinType";
    pub const BUSINESS_MEANING: &str = "businessMeaning";

    pub const TAG_NAME: &str = "tagName";
    pub const TAG_DESCRIPTION: &str = "tagDescription";
    pub const BUSINESS_PRIORITY: &str = "businessPriority";
    pub const DATA_SENSITIVITY: &str = "dataSensitivity";
}

/// Fields whose values are structured documents, possibly encoded as JSON text.
pub const STRUCTURED_FIELDS: [&str; 3] = [
    fields::DETAILED_COLUMN_INFO,
    fields::ANSWERABLE_QUESTIONS,
    fields::LLM_HINTS,
];

/// Which of the three catalog collections a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Dataset,
    Relationship,
    DomainTag,
}

impl RecordKind {
    /// Fields that must be present and non-null for validation to pass.
    #[inline]
    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            RecordKind::Dataset => &[
                fields::TABLE_NAME,
                fields::ZONE,
                fields::ORIGINAL_FILE_NAME,
                fields::RECORD_COUNT,
                fields::COLUMNS_ARRAY,
                fields::DETAILED_COLUMN_INFO,
            ],
            RecordKind::Relationship => &[
                fields::FROM_TABLE,
                fields::FROM_COLUMN,
                fields::TO_TABLE,
                fields::TO_COLUMN,
            ],
            RecordKind::DomainTag => &[fields::TAG_NAME],
        }
    }

    /// Natural-key fields, in canonical order.
    #[inline]
    pub const fn key_fields(self) -> &'static [&'static str] {
        match self {
            RecordKind::Dataset => &[fields::TABLE_NAME, fields::ZONE],
            RecordKind::Relationship => &[
                fields::FROM_TABLE,
                fields::FROM_COLUMN,
                fields::TO_TABLE,
                fields::TO_COLUMN,
            ],
            RecordKind::DomainTag => &[fields::TAG_NAME],
        }
    }

    /// Collection name used when the configuration does not override it.
    #[inline]
    pub const fn default_collection(self) -> &'static str {
        match self {
            RecordKind::Dataset => "DatasetMetadata",
            RecordKind::Relationship => "DataRelationship",
            RecordKind::DomainTag => "DomainTag",
        }
    }
}

impl fmt::Display for RecordKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RecordKind::Dataset => write!(f, "dataset"),
            RecordKind::Relationship => write!(f, "relationship"),
            RecordKind::DomainTag => write!(f, "domain tag"),
        }
    }
}

/// Data-lifecycle stage of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Zone {
    Raw,
    Cleansed,
    Curated,
}

impl Zone {
    pub const ALL: [Zone; 3] = [Zone::Raw, Zone::Cleansed, Zone::Curated];

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Zone::Raw => "Raw",
            Zone::Cleansed => "Cleansed",
            Zone::Curated => "Curated",
        }
    }
}

impl fmt::Display for Zone {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = String;

    /// Zone names are matched exactly; `raw` is not a zone.
    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Zone::ALL
            .into_iter()
            .find(|zone| zone.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "Zone must be one of: {} (got '{}')",
                    Zone::ALL.map(Zone::as_str).join(", "),
                    s
                )
            })
    }
}

/// Business priority of a domain tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

impl fmt::Display for Priority {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Priority::ALL
            .into_iter()
            .find(|priority| priority.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                format!(
                    "Field {} must be one of: {} (got '{}')",
                    fields::BUSINESS_PRIORITY,
                    Priority::ALL.map(Priority::as_str).join(", "),
                    s
                )
            })
    }
}

/// Loosely-typed metadata as read from a descriptor file.
///
/// Lookups accept the camelCase field name or its snake_case spelling, with
/// camelCase taking precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawMetadata(Map<String, Value>);

/// Section of a dataset descriptor whose keys are lifted to the top level.
const NESTED_SECTION: &str = "dataset_info";

impl RawMetadata {
    #[inline]
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Build from a JSON value, which must be an object.
    ///
    /// Keys of a nested `dataset_info` object are merged into the top level
    /// without overriding keys that are already there.
    #[inline]
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };

        if let Some(Value::Object(section)) = map.remove(NESTED_SECTION) {
            for (key, value) in section {
                map.entry(key).or_insert(value);
            }
        }

        Some(Self(map))
    }

    /// Raw value for a field, including explicit nulls.
    #[inline]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0
            .get(field)
            .or_else(|| self.0.get(snake_case(field).as_str()))
    }

    /// Value for a field, treating an explicit null as absent.
    #[inline]
    pub fn present(&self, field: &str) -> Option<&Value> {
        self.get(field).filter(|value| !value.is_null())
    }

    #[inline]
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    #[inline]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Best-effort human-readable key, used to label records that failed
    /// validation and therefore have no [`NaturalKey`].
    #[inline]
    pub fn display_key(&self, kind: RecordKind) -> String {
        let part = |field: &str| {
            self.present(field)
                .map(|value| match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "?".to_string())
        };

        match kind {
            RecordKind::Dataset => {
                if self.present(fields::TABLE_NAME).is_none() {
                    return "Unknown".to_string();
                }
                format!("{} ({})", part(fields::TABLE_NAME), part(fields::ZONE))
            }
            RecordKind::Relationship => format!(
                "{}.{} -> {}.{}",
                part(fields::FROM_TABLE),
                part(fields::FROM_COLUMN),
                part(fields::TO_TABLE),
                part(fields::TO_COLUMN)
            ),
            RecordKind::DomainTag => {
                if self.present(fields::TAG_NAME).is_none() {
                    return "Unknown".to_string();
                }
                part(fields::TAG_NAME)
            }
        }
    }
}

impl From<Map<String, Value>> for RawMetadata {
    #[inline]
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// `columnsArray` -> `columns_array`
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
