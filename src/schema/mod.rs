//! Collection definitions for the three catalog collections and the
//! operations that create and check them.
//!
//! Each property is either vectorized (its text feeds the embedding that
//! similarity search runs against) or skipped (kept for exact matching and
//! display only).

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metadata::{Normalizer, RawMetadata, RecordKind, fields};
use crate::store::{StoreClient, StoreError};

pub const DEFAULT_VECTORIZER_MODULE: &str = "text2vec-aws";
pub const DEFAULT_VECTORIZER_MODEL: &str = "cohere.embed-english-v3";
pub const DEFAULT_VECTORIZER_REGION: &str = "us-east-1";

/// Table name of the record written by [`probe`].
pub const PROBE_TABLE: &str = "catalog_kb_probe";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    TextArray,
    Int,
    Date,
}

impl DataType {
    /// Name of the type in the store's schema language.
    #[inline]
    pub const fn store_name(self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::TextArray => "text[]",
            DataType::Int => "int",
            DataType::Date => "date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub data_type: DataType,
    pub description: String,
    pub vectorize: bool,
}

impl PropertyDef {
    fn new(name: &str, data_type: DataType, description: &str, vectorize: bool) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            description: description.to_string(),
            vectorize,
        }
    }
}

/// Embedding module the store uses to vectorize a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vectorizer {
    pub module: String,
    pub model: String,
    pub region: String,
}

impl Default for Vectorizer {
    fn default() -> Self {
        Self {
            module: DEFAULT_VECTORIZER_MODULE.to_string(),
            model: DEFAULT_VECTORIZER_MODEL.to_string(),
            region: DEFAULT_VECTORIZER_REGION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDef {
    pub name: String,
    pub description: String,
    pub properties: Vec<PropertyDef>,
    /// `None` stores objects without vectors.
    pub vectorizer: Option<Vectorizer>,
}

impl CollectionDef {
    #[inline]
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|property| property.name == name)
    }

    #[inline]
    pub fn vectorized_properties(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|property| property.vectorize)
            .map(|property| property.name.as_str())
            .collect()
    }

    #[inline]
    pub fn property_names(&self) -> Vec<&str> {
        self.properties
            .iter()
            .map(|property| property.name.as_str())
            .collect()
    }

    /// Class document accepted by the store's schema endpoint.
    #[inline]
    pub fn to_store_class(&self) -> Value {
        let properties: Vec<Value> = self
            .properties
            .iter()
            .map(|property| {
                let mut entry = json!({
                    "name": property.name,
                    "dataType": [property.data_type.store_name()],
                    "description": property.description,
                });
                if let Some(vectorizer) = &self.vectorizer {
                    entry["moduleConfig"] = keyed(
                        &vectorizer.module,
                        json!({
                            "skip": !property.vectorize,
                            "vectorizePropertyName": property.vectorize,
                        }),
                    );
                }
                entry
            })
            .collect();

        let mut class = Map::new();
        class.insert("class".to_string(), json!(self.name));
        class.insert("description".to_string(), json!(self.description));
        match &self.vectorizer {
            Some(vectorizer) => {
                class.insert("vectorizer".to_string(), json!(vectorizer.module));
                class.insert(
                    "moduleConfig".to_string(),
                    keyed(
                        &vectorizer.module,
                        json!({
                            "model": vectorizer.model,
                            "region": vectorizer.region,
                            "service": "bedrock",
                            "vectorizeClassName": false,
                        }),
                    ),
                );
            }
            None => {
                class.insert("vectorizer".to_string(), json!("none"));
            }
        }
        class.insert("properties".to_string(), Value::Array(properties));
        Value::Object(class)
    }
}

/// Single-entry object `{key: value}`.
fn keyed(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

/// Definition of the dataset collection. Descriptive text, tags and
/// answerable questions are vectorized; identity, structure, governance and
/// timestamps are not.
#[inline]
pub fn dataset_collection(name: &str, vectorizer: &Vectorizer) -> CollectionDef {
    use DataType::{Date, Int, Text, TextArray};

    CollectionDef {
        name: name.to_string(),
        description: "Dataset catalog with semantic search over business descriptions".to_string(),
        properties: vec![
            PropertyDef::new(fields::TABLE_NAME, Text, "Primary unique name for the dataset", false),
            PropertyDef::new(fields::ORIGINAL_FILE_NAME, Text, "Original file name", false),
            PropertyDef::new(fields::ATHENA_TABLE_NAME, Text, "Athena table name", false),
            PropertyDef::new(fields::ZONE, Text, "Data processing zone (Raw/Cleansed/Curated)", false),
            PropertyDef::new(fields::FORMAT, Text, "File format (CSV, Parquet, ...)", false),
            PropertyDef::new(fields::DESCRIPTION, Text, "Human-written summary of the dataset", true),
            PropertyDef::new(fields::BUSINESS_PURPOSE, Text, "Business questions this dataset helps answer", true),
            PropertyDef::new(fields::COLUMN_SEMANTICS, Text, "Column names and descriptions", true),
            PropertyDef::new(fields::TAGS, TextArray, "Keywords and categories", true),
            PropertyDef::new(fields::COLUMNS_ARRAY, TextArray, "Column names in order", false),
            PropertyDef::new(fields::DETAILED_COLUMN_INFO, Text, "JSON document describing each column", false),
            PropertyDef::new(fields::RECORD_COUNT, Int, "Number of records", false),
            PropertyDef::new(fields::DATA_OWNER, Text, "Team or person responsible for the data", false),
            PropertyDef::new(fields::SOURCE_SYSTEM, Text, "System that produced the data", false),
            PropertyDef::new(fields::METADATA_CREATED_AT, Date, "When this metadata was created", false),
            PropertyDef::new(fields::DATA_LAST_MODIFIED_AT, Date, "When the data was last modified", false),
            PropertyDef::new(fields::ANSWERABLE_QUESTIONS, Text, "JSON list of questions this dataset can answer", true),
            PropertyDef::new(fields::LLM_HINTS, Text, "JSON document with SQL generation hints", false),
        ],
        vectorizer: Some(vectorizer.clone()),
    }
}

/// Definition of the relationship collection. Join paths are looked up by
/// table name, so nothing is vectorized.
#[inline]
pub fn relationship_collection(name: &str) -> CollectionDef {
    use DataType::Text;

    CollectionDef {
        name: name.to_string(),
        description: "Join paths between datasets".to_string(),
        properties: vec![
            PropertyDef::new(fields::FROM_TABLE, Text, "Source table of the join", false),
            PropertyDef::new(fields::FROM_COLUMN, Text, "Column in the source table", false),
            PropertyDef::new(fields::TO_TABLE, Text, "Target table of the join", false),
            PropertyDef::new(fields::TO_COLUMN, Text, "Column in the target table", false),
            PropertyDef::new(fields::RELATIONSHIP_TYPE, Text, "Relationship type (foreign_key, ...)", false),
            PropertyDef::new(fields::CARDINALITY, Text, "Cardinality (many-to-one, ...)", false),
            PropertyDef::new(fields::SUGGESTED_JOIN_TYPE, Text, "Suggested SQL join (INNER, LEFT, ...)", false),
            PropertyDef::new(fields::BUSINESS_MEANING, Text, "What the relationship means", false),
        ],
        vectorizer: None,
    }
}

/// Definition of the domain tag collection; only the description is vectorized.
#[inline]
pub fn domain_tag_collection(name: &str, vectorizer: &Vectorizer) -> CollectionDef {
    use DataType::Text;

    CollectionDef {
        name: name.to_string(),
        description: "Business domain tags with semantic search on descriptions".to_string(),
        properties: vec![
            PropertyDef::new(fields::TAG_NAME, Text, "Unique name of the tag", false),
            PropertyDef::new(fields::TAG_DESCRIPTION, Text, "What this domain covers", true),
            PropertyDef::new(fields::BUSINESS_PRIORITY, Text, "Business priority (High, Medium, Low)", false),
            PropertyDef::new(fields::DATA_SENSITIVITY, Text, "Data sensitivity classification", false),
        ],
        vectorizer: Some(vectorizer.clone()),
    }
}

/// Definition for the collection holding records of `kind`.
#[inline]
pub fn collection_for(kind: RecordKind, name: &str, vectorizer: &Vectorizer) -> CollectionDef {
    match kind {
        RecordKind::Dataset => dataset_collection(name, vectorizer),
        RecordKind::Relationship => relationship_collection(name),
        RecordKind::DomainTag => domain_tag_collection(name, vectorizer),
    }
}

/// What to do with a collection that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existing {
    Keep,
    Recreate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub created: Vec<String>,
    pub recreated: Vec<String>,
    pub kept: Vec<String>,
}

/// Create every collection in `definitions` that does not exist yet.
///
/// For collections that already exist `on_existing` decides whether they
/// are kept or dropped and created again. Dropping deletes their objects.
#[inline]
pub fn ensure_collections<S, F>(
    store: &S,
    definitions: &[CollectionDef],
    mut on_existing: F,
) -> Result<SchemaReport, StoreError>
where
    S: StoreClient + ?Sized,
    F: FnMut(&CollectionDef) -> Existing,
{
    let mut report = SchemaReport::default();

    for definition in definitions {
        if !store.exists(&definition.name)? {
            info!(
                "Creating collection {} with {} properties ({} vectorized)",
                definition.name,
                definition.properties.len(),
                definition.vectorized_properties().len()
            );
            store.create_collection(definition)?;
            report.created.push(definition.name.clone());
            continue;
        }

        match on_existing(definition) {
            Existing::Keep => {
                debug!("Keeping existing collection {}", definition.name);
                report.kept.push(definition.name.clone());
            }
            Existing::Recreate => {
                warn!("Dropping and recreating collection {}", definition.name);
                store.delete_collection(&definition.name)?;
                store.create_collection(definition)?;
                report.recreated.push(definition.name.clone());
            }
        }
    }

    Ok(report)
}

/// Names from `expected` that the store does not have.
#[inline]
pub fn missing_collections<S: StoreClient + ?Sized>(
    store: &S,
    expected: &[&str],
) -> Result<Vec<String>, StoreError> {
    let existing = store.list_collections()?;
    Ok(expected
        .iter()
        .filter(|name| !existing.iter().any(|have| have == *name))
        .map(|name| (*name).to_string())
        .collect())
}

/// Queries [`probe`] runs against its own record.
pub const PROBE_QUERIES: [&str; 3] = [
    "unhappy customer",
    "service performance",
    "business metrics",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub id: Uuid,
    /// Each query and whether the probe record came back for it.
    pub queries: Vec<(String, bool)>,
}

impl ProbeReport {
    #[inline]
    pub fn all_found(&self) -> bool {
        self.queries.iter().all(|(_, found)| *found)
    }
}

/// Raw descriptor of the probe record.
fn probe_metadata() -> RawMetadata {
    let value = json!({
        "tableName": PROBE_TABLE,
        "originalFileName": "probe.csv",
        "zone": "Raw",
        "format": "CSV",
        "description": "Customer satisfaction ratings and service quality metrics for business analysis",
        "businessPurpose": "Measure customer happiness and service performance for operational improvements",
        "columnSemanticsConcatenated": "rating: customer satisfaction score; feedback: customer comments about service quality",
        "tags": ["customer satisfaction", "service quality", "ratings", "feedback"],
        "recordCount": 100,
        "columnsArray": ["rating", "feedback", "date"],
        "detailedColumnInfo": { "columns": [{ "name": "rating", "description": "satisfaction score" }] },
        "dataOwner": "catalog-kb",
        "sourceSystem": "catalog-kb",
    });
    RawMetadata::from_value(value).unwrap_or_default()
}

/// Write a throwaway dataset record, search for it with loosely related
/// phrasing and delete it again.
///
/// A record that is not found usually means the vectorizer module is not
/// configured. `settle` is slept between the write and the searches.
#[inline]
pub fn probe<S: StoreClient + ?Sized>(
    store: &S,
    collection: &str,
    settle: Duration,
) -> Result<ProbeReport, StoreError> {
    let record = Normalizer::default().dataset(&probe_metadata());
    let id = record.natural_key().identifier();
    let properties = crate::metadata::NormalizedRecord::Dataset(record).to_properties();

    store.upsert(collection, id, &properties)?;
    debug!("Inserted probe record {}", id);

    if !settle.is_zero() {
        thread::sleep(settle);
    }

    let mut queries = Vec::with_capacity(PROBE_QUERIES.len());
    let mut failure = None;
    for query in PROBE_QUERIES {
        match store.fetch_by_query(collection, query, 3) {
            Ok(hits) => {
                let found = hits.iter().any(|hit| hit.id == id);
                if !found {
                    warn!("Probe query '{}' did not return the probe record", query);
                }
                queries.push((query.to_string(), found));
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    // Clean up before reporting a search failure.
    store.delete_object(collection, id)?;
    debug!("Removed probe record {}", id);

    match failure {
        Some(e) => Err(e),
        None => Ok(ProbeReport { id, queries }),
    }
}
