
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::records::{ColumnInfo, DatasetRecord, DomainTagRecord, NormalizedRecord, RelationshipRecord};
use super::{Priority, RawMetadata, RecordKind, Zone, fields};

/// Marker appended to truncated text.
pub const ELLIPSIS: &str = "...";

const DEFAULT_FORMAT: &str = "CSV";
const DEFAULT_RELATIONSHIP_TYPE: &str = "foreign_key";
const DEFAULT_CARDINALITY: &str = "many-to-one";
const DEFAULT_JOIN_TYPE: &str = "INNER";
const DEFAULT_SENSITIVITY: &str = "Internal";

const EMPTY_OBJECT: &str = "{}";
const EMPTY_ARRAY: &str = "[]";

/// Fixed documents substituted by the compact profile.
const COMPACT_QUESTIONS: &str =
    r#"["What data does this dataset contain?", "How can this dataset be used?"]"#;
const COMPACT_HINTS: &str = r#"{"type": "tabular", "format": "structured"}"#;

/// How much of the raw metadata is carried into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Every field as given.
    #[default]
    Full,
    /// Vectorized fields bounded by [`SizeLimits`] and the free-form
    /// documents replaced by short fixed ones, which keeps vectorizer
    /// requests small.
    Compact,
}

impl Profile {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Profile::Full => "full",
            Profile::Compact => "compact",
        }
    }
}

/// Ceilings applied by [`Profile::Compact`], in characters (tags in entries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeLimits {
    pub description: usize,
    pub business_purpose: usize,
    pub column_semantics: usize,
    pub tags: usize,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            description: 300,
            business_purpose: 200,
            column_semantics: 500,
            tags: 5,
        }
    }
}

/// Shapes raw metadata into typed records.
///
/// `now` fills absent timestamps, so the same normalizer always produces the
/// same output for the same input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    profile: Profile,
    limits: SizeLimits,
    now: DateTime<Utc>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Profile::Full, SizeLimits::default())
    }
}

impl Normalizer {
    #[inline]
    pub fn new(profile: Profile, limits: SizeLimits) -> Self {
        Self {
            profile,
            limits,
            now: Utc::now(),
        }
    }

    /// Pin the instant used for absent timestamps.
    #[inline]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    #[inline]
    pub fn profile(&self) -> Profile {
        self.profile
    }

    #[inline]
    pub fn normalize(&self, raw: &RawMetadata, kind: RecordKind) -> NormalizedRecord {
        match kind {
            RecordKind::Dataset => NormalizedRecord::Dataset(self.dataset(raw)),
            RecordKind::Relationship => NormalizedRecord::Relationship(self.relationship(raw)),
            RecordKind::DomainTag => NormalizedRecord::DomainTag(self.domain_tag(raw)),
        }
    }

    #[inline]
    pub fn dataset(&self, raw: &RawMetadata) -> DatasetRecord {
        let detailed_column_info = json_text(raw.get(fields::DETAILED_COLUMN_INFO), EMPTY_OBJECT);

        let mut column_semantics = text(raw.get(fields::COLUMN_SEMANTICS), "");
        if column_semantics.trim().is_empty() {
            column_semantics =
                ColumnInfo::semantics(&ColumnInfo::from_json_text(&detailed_column_info));
        }

        let zone = raw
            .present(fields::ZONE)
            .and_then(Value::as_str)
            .and_then(|zone| zone.parse().ok())
            .unwrap_or(Zone::Raw);

        let mut record = DatasetRecord {
            table_name: text(raw.get(fields::TABLE_NAME), ""),
            original_file_name: text(raw.get(fields::ORIGINAL_FILE_NAME), ""),
            athena_table_name: text(raw.get(fields::ATHENA_TABLE_NAME), ""),
            zone,
            format: text(raw.get(fields::FORMAT), DEFAULT_FORMAT),
            description: text(raw.get(fields::DESCRIPTION), ""),
            business_purpose: text(raw.get(fields::BUSINESS_PURPOSE), ""),
            tags: string_list(raw.get(fields::TAGS)),
            column_semantics_concatenated: column_semantics,
            columns_array: string_list(raw.get(fields::COLUMNS_ARRAY)),
            detailed_column_info,
            record_count: count(raw.get(fields::RECORD_COUNT)),
            data_owner: text(raw.get(fields::DATA_OWNER), ""),
            source_system: text(raw.get(fields::SOURCE_SYSTEM), ""),
            metadata_created_at: timestamp(raw.get(fields::METADATA_CREATED_AT), self.now),
            data_last_modified_at: timestamp(raw.get(fields::DATA_LAST_MODIFIED_AT), self.now),
            llm_hints: json_text(raw.get(fields::LLM_HINTS), EMPTY_OBJECT),
            answerable_questions: json_text(raw.get(fields::ANSWERABLE_QUESTIONS), EMPTY_ARRAY),
        };

        if self.profile == Profile::Compact {
            record.description = truncate_text(&record.description, self.limits.description);
            record.business_purpose =
                truncate_text(&record.business_purpose, self.limits.business_purpose);
            record.column_semantics_concatenated = truncate_text(
                &record.column_semantics_concatenated,
                self.limits.column_semantics,
            );
            record.tags = truncate_tags(&record.tags, self.limits.tags);
            record.answerable_questions = COMPACT_QUESTIONS.to_string();
            record.llm_hints = COMPACT_HINTS.to_string();
        }

        record
    }

    #[inline]
    pub fn relationship(&self, raw: &RawMetadata) -> RelationshipRecord {
        RelationshipRecord {
            from_table: text(raw.get(fields::FROM_TABLE), ""),
            from_column: text(raw.get(fields::FROM_COLUMN), ""),
            to_table: text(raw.get(fields::TO_TABLE), ""),
            to_column: text(raw.get(fields::TO_COLUMN), ""),
            relationship_type: text(raw.get(fields::RELATIONSHIP_TYPE), DEFAULT_RELATIONSHIP_TYPE),
            cardinality: text(raw.get(fields::CARDINALITY), DEFAULT_CARDINALITY),
            suggested_join_type: text(raw.get(fields::SUGGESTED_JOIN_TYPE), DEFAULT_JOIN_TYPE),
            business_meaning: text(raw.get(fields::BUSINESS_MEANING), ""),
        }
    }

    #[inline]
    pub fn domain_tag(&self, raw: &RawMetadata) -> DomainTagRecord {
        DomainTagRecord {
            tag_name: text(raw.get(fields::TAG_NAME), ""),
            tag_description: text(raw.get(fields::TAG_DESCRIPTION), ""),
            business_priority: raw
                .present(fields::BUSINESS_PRIORITY)
                .and_then(Value::as_str)
                .and_then(|priority| priority.parse::<Priority>().ok())
                .unwrap_or_default(),
            data_sensitivity: text(raw.get(fields::DATA_SENSITIVITY), DEFAULT_SENSITIVITY),
        }
    }
}

/// Cut `text` to at most `max_chars` characters.
///
/// Truncated output is exactly `max_chars` long and ends in [`ELLIPSIS`];
/// when the ceiling is too small to hold the marker the text is cut bare.
#[inline]
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let marker_len = ELLIPSIS.chars().count();
    if max_chars <= marker_len {
        return text.chars().take(max_chars).collect();
    }

    let mut out: String = text.chars().take(max_chars - marker_len).collect();
    out.push_str(ELLIPSIS);
    out
}

/// First `max_tags` tags, in their original order.
#[inline]
pub fn truncate_tags(tags: &[String], max_tags: usize) -> Vec<String> {
    tags.iter().take(max_tags).cloned().collect()
}

/// Parse an ISO-8601 instant. Accepts RFC 3339, a naive date-time (taken as
/// UTC) or a bare date (midnight UTC).
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(parsed.and_utc());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

/// Scalar to text; absent and null fall back to `default`.
fn text(value: Option<&Value>, default: &str) -> String {
    match value {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Structured document to JSON text; absent, null and blank fall back to
/// `default`. Text is passed through unchanged.
fn json_text(value: Option<&Value>, default: &str) -> String {
    match value {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => list_items(items),
        Some(Value::String(s)) if s.trim().is_empty() => Vec::new(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => list_items(&items),
            _ => vec![s.clone()],
        },
        Some(other) => vec![other.to_string()],
    }
}

fn list_items(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter(|item| !item.is_null())
        .map(|item| text(Some(item), ""))
        .collect()
}

/// Non-negative integer count; negatives and non-numbers become 0 and
/// fractions are truncated.
fn count(value: Option<&Value>) -> u64 {
    let number = match value {
        Some(Value::Number(n)) => {
            if let Some(unsigned) = n.as_u64() {
                return unsigned;
            }
            n.as_f64()
        }
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(n) if n.is_finite() && n > 0.0 => n.trunc() as u64,
        _ => 0,
    }
}

fn timestamp(value: Option<&Value>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    value
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or(fallback)
}
