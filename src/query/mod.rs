//! Read-side helpers: semantic search over datasets, column relevance,
//! column inspection and collection verification.


use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CollectionNames;
use crate::metadata::{ColumnInfo, RecordKind, fields};
use crate::store::{StoreClient, StoreError, StoredObject};

pub const DEFAULT_SEARCH_LIMIT: usize = 3;
pub const MAX_RELEVANT_COLUMNS: usize = 10;
/// Columns shown when none look relevant to the query.
pub const SAMPLE_COLUMNS: usize = 5;
const PREVIEW_CHARS: usize = 100;

/// Queries for checking that column descriptions are searchable.
pub const COLUMN_QUERIES: [&str; 6] = [
    "email address",
    "customer ID",
    "phone number",
    "pricing information",
    "date columns",
    "location data",
];

/// Query words that widen column matching to related names.
const COLUMN_SYNONYMS: [(&str, &[&str]); 6] = [
    ("email", &["email", "mail"]),
    ("phone", &["phone", "tel"]),
    ("date", &["date", "time"]),
    ("address", &["address", "location"]),
    ("price", &["price", "cost", "charge"]),
    ("cost", &["price", "cost", "charge"]),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetHit {
    pub id: Uuid,
    pub table_name: String,
    pub zone: String,
    pub description: String,
    pub record_count: u64,
    pub columns: Vec<String>,
    /// Columns whose names look related to the query.
    pub relevant_columns: Vec<String>,
    pub distance: Option<f32>,
}

impl DatasetHit {
    #[inline]
    pub fn from_object(object: &StoredObject, query: &str) -> Self {
        let columns = object.text_list(fields::COLUMNS_ARRAY);
        Self {
            id: object.id,
            table_name: non_empty_or(object.text(fields::TABLE_NAME), "Unknown"),
            zone: object.text(fields::ZONE).to_string(),
            description: object.text(fields::DESCRIPTION).to_string(),
            record_count: object
                .integer(fields::RECORD_COUNT)
                .and_then(|count| u64::try_from(count).ok())
                .unwrap_or_default(),
            relevant_columns: relevant_columns(query, &columns),
            columns,
            distance: object.distance,
        }
    }

    /// Relevant columns, or the first few when nothing matched.
    #[inline]
    pub fn columns_to_show(&self) -> &[String] {
        if self.relevant_columns.is_empty() {
            let end = self.columns.len().min(SAMPLE_COLUMNS);
            &self.columns[..end]
        } else {
            &self.relevant_columns
        }
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

/// Semantic search over the dataset collection.
#[inline]
pub fn search<S: StoreClient + ?Sized>(
    store: &S,
    collection: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<DatasetHit>, StoreError> {
    debug!("Searching {} for '{}' (limit {})", collection, query, limit);
    let objects = store.fetch_by_query(collection, query, limit)?;
    Ok(objects
        .iter()
        .map(|object| DatasetHit::from_object(object, query))
        .collect())
}

/// Column names related to `query`, in column order, without duplicates and
/// at most [`MAX_RELEVANT_COLUMNS`].
///
/// A column matches when it contains a query word of three or more letters,
/// equals a shorter query word, or matches one of the synonym groups the
/// query mentions. `id` in the query selects columns starting or ending
/// with `id`.
#[inline]
pub fn relevant_columns(query: &str, columns: &[String]) -> Vec<String> {
    let words: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect();
    let mentions = |word: &str| words.iter().any(|w| w == word);

    let synonyms: Vec<&str> = COLUMN_SYNONYMS
        .iter()
        .filter(|(trigger, _)| mentions(trigger))
        .flat_map(|(_, related)| related.iter().copied())
        .collect();
    let wants_ids = mentions("id");

    let mut relevant: Vec<String> = Vec::new();
    for column in columns {
        let lower = column.to_lowercase();
        let matched = words.iter().any(|word| {
            if word.chars().count() >= 3 {
                lower.contains(word.as_str())
            } else {
                lower == *word
            }
        }) || synonyms.iter().any(|related| lower.contains(related))
            || (wants_ids && (lower.starts_with("id") || lower.ends_with("id")));

        if matched && !relevant.contains(column) {
            relevant.push(column.clone());
            if relevant.len() == MAX_RELEVANT_COLUMNS {
                break;
            }
        }
    }
    relevant
}

/// How much structured column information a stored dataset carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "columns", rename_all = "snake_case")]
pub enum DetailedColumns {
    Parsed(Vec<ColumnInfo>),
    /// Present but not a column list.
    Unstructured,
    Missing,
}

impl DetailedColumns {
    #[inline]
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "{}" || trimmed == "[]" {
            return Self::Missing;
        }
        let columns = ColumnInfo::from_json_text(trimmed);
        if columns.is_empty() {
            Self::Unstructured
        } else {
            Self::Parsed(columns)
        }
    }
}

/// Column information stored for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInspection {
    pub id: Uuid,
    pub table_name: String,
    pub columns: Vec<String>,
    pub detailed: DetailedColumns,
    pub semantics_length: usize,
    pub semantics_preview: String,
}

impl ColumnInspection {
    #[inline]
    pub fn from_object(object: &StoredObject) -> Self {
        let semantics = object.text(fields::COLUMN_SEMANTICS);
        let semantics_length = semantics.chars().count();
        let semantics_preview = if semantics_length > PREVIEW_CHARS {
            format!("{}...", semantics.chars().take(PREVIEW_CHARS).collect::<String>())
        } else {
            semantics.to_string()
        };

        Self {
            id: object.id,
            table_name: non_empty_or(object.text(fields::TABLE_NAME), "Unknown"),
            columns: object.text_list(fields::COLUMNS_ARRAY),
            detailed: DetailedColumns::from_text(object.text(fields::DETAILED_COLUMN_INFO)),
            semantics_length,
            semantics_preview,
        }
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Column information for up to `limit` stored datasets.
#[inline]
pub fn inspect<S: StoreClient + ?Sized>(
    store: &S,
    collection: &str,
    limit: usize,
) -> Result<Vec<ColumnInspection>, StoreError> {
    let objects = store.fetch_objects(collection, limit)?;
    Ok(objects.iter().map(ColumnInspection::from_object).collect())
}

/// Short label for a stored object of `kind`.
#[inline]
pub fn sample_label(kind: RecordKind, object: &StoredObject) -> String {
    let part = |field: &str| non_empty_or(object.text(field), "?");
    match kind {
        RecordKind::Dataset => non_empty_or(object.text(fields::TABLE_NAME), "Unknown"),
        RecordKind::Relationship => {
            format!("{} -> {}", part(fields::FROM_TABLE), part(fields::TO_TABLE))
        }
        RecordKind::DomainTag => non_empty_or(object.text(fields::TAG_NAME), "Unknown"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSample {
    pub count: u64,
    pub sample: Option<String>,
}

/// Verification outcome for one collection. A failing collection does not
/// stop the others from being checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStatus {
    pub kind: RecordKind,
    pub collection: String,
    pub outcome: Result<CollectionSample, StoreError>,
}

impl CollectionStatus {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Count and sample every catalog collection.
#[inline]
pub fn verify<S: StoreClient + ?Sized>(
    store: &S,
    collections: &CollectionNames,
) -> Vec<CollectionStatus> {
    [RecordKind::Dataset, RecordKind::Relationship, RecordKind::DomainTag]
        .into_iter()
        .map(|kind| {
            let collection = collections.for_kind(kind).to_string();
            let outcome = sample_collection(store, &collection, kind);
            if let Err(e) = &outcome {
                warn!("Verification of {} failed: {}", collection, e);
            }
            CollectionStatus {
                kind,
                collection,
                outcome,
            }
        })
        .collect()
}

fn sample_collection<S: StoreClient + ?Sized>(
    store: &S,
    collection: &str,
    kind: RecordKind,
) -> Result<CollectionSample, StoreError> {
    let count = store.count_all(collection)?;
    let sample = store
        .fetch_objects(collection, 1)?
        .first()
        .map(|object| sample_label(kind, object));
    Ok(CollectionSample { count, sample })
}
