use super::*;
use crate::store::{FailureKind, MemoryStore};

#[test]
fn dataset_collection_covers_every_record_field() {
    let definition = dataset_collection("DatasetMetadata", &Vectorizer::default());
    assert_eq!(definition.properties.len(), 18);
    assert_eq!(
        definition.vectorized_properties(),
        vec![
            fields::DESCRIPTION,
            fields::BUSINESS_PURPOSE,
            fields::COLUMN_SEMANTICS,
            fields::TAGS,
            fields::ANSWERABLE_QUESTIONS,
        ]
    );
    assert_eq!(
        definition.property(fields::RECORD_COUNT).map(|p| p.data_type),
        Some(DataType::Int)
    );
    assert_eq!(
        definition.property(fields::METADATA_CREATED_AT).map(|p| p.data_type),
        Some(DataType::Date)
    );
}

#[test]
fn dataset_collection_matches_normalized_properties() {
    use crate::metadata::{NormalizedRecord, RawMetadata};
    use serde_json::json;

    let raw = RawMetadata::from_value(json!({ "tableName": "orders", "zone": "Raw" }))
        .expect("object literal");
    let properties = NormalizedRecord::Dataset(Normalizer::default().dataset(&raw)).to_properties();
    let definition = dataset_collection("DatasetMetadata", &Vectorizer::default());

    let mut stored: Vec<&str> = properties.keys().map(String::as_str).collect();
    let mut declared = definition.property_names();
    stored.sort_unstable();
    declared.sort_unstable();
    assert_eq!(stored, declared);
}

#[test]
fn relationship_collection_is_not_vectorized() {
    let definition = relationship_collection("DataRelationship");
    assert!(definition.vectorizer.is_none());
    assert!(definition.vectorized_properties().is_empty());
    assert!(definition.property(fields::FROM_TABLE).is_some());

    let class = definition.to_store_class();
    assert_eq!(class["vectorizer"], "none");
    assert!(class.get("moduleConfig").is_none());
    assert!(class["properties"][0].get("moduleConfig").is_none());
}

#[test]
fn store_class_document() {
    let vectorizer = Vectorizer {
        module: "text2vec-aws".to_string(),
        model: "amazon.titan-embed-text-v2:0".to_string(),
        region: "eu-west-1".to_string(),
    };
    let class = domain_tag_collection("DomainTag", &vectorizer).to_store_class();

    assert_eq!(class["class"], "DomainTag");
    assert_eq!(class["vectorizer"], "text2vec-aws");
    assert_eq!(class["moduleConfig"]["text2vec-aws"]["model"], "amazon.titan-embed-text-v2:0");
    assert_eq!(class["moduleConfig"]["text2vec-aws"]["region"], "eu-west-1");
    assert_eq!(class["moduleConfig"]["text2vec-aws"]["service"], "bedrock");

    let properties = class["properties"].as_array().expect("property list");
    assert_eq!(properties.len(), 4);
    assert_eq!(properties[0]["name"], "tagName");
    assert_eq!(properties[0]["dataType"][0], "text");
    assert_eq!(properties[0]["moduleConfig"]["text2vec-aws"]["skip"], true);
    assert_eq!(properties[1]["moduleConfig"]["text2vec-aws"]["skip"], false);
    assert_eq!(
        properties[1]["moduleConfig"]["text2vec-aws"]["vectorizePropertyName"],
        true
    );
}

#[test]
fn collection_for_kind() {
    let vectorizer = Vectorizer::default();
    assert_eq!(
        collection_for(RecordKind::Relationship, "Joins", &vectorizer),
        relationship_collection("Joins")
    );
    assert_eq!(
        collection_for(RecordKind::DomainTag, "Tags", &vectorizer).properties.len(),
        4
    );
}

fn catalog() -> Vec<CollectionDef> {
    let vectorizer = Vectorizer::default();
    vec![
        dataset_collection("DatasetMetadata", &vectorizer),
        relationship_collection("DataRelationship"),
        domain_tag_collection("DomainTag", &vectorizer),
    ]
}

#[test]
fn ensure_creates_missing_collections() {
    let store = MemoryStore::new();
    let report = ensure_collections(&store, &catalog(), |_| Existing::Keep).expect("created");

    assert_eq!(
        report.created,
        vec!["DatasetMetadata", "DataRelationship", "DomainTag"]
    );
    assert!(report.kept.is_empty());
    assert_eq!(
        missing_collections(&store, &["DatasetMetadata", "DomainTag"]),
        Ok(Vec::new())
    );
}

#[test]
fn ensure_asks_about_existing_collections() {
    let definitions = catalog();
    let store = MemoryStore::with_collections(&definitions[..1]);
    store
        .upsert("DatasetMetadata", Uuid::from_u128(1), &Map::new())
        .expect("stored");

    let mut asked = Vec::new();
    let report = ensure_collections(&store, &definitions, |definition| {
        asked.push(definition.name.clone());
        Existing::Recreate
    })
    .expect("ensured");

    assert_eq!(asked, vec!["DatasetMetadata"]);
    assert_eq!(report.recreated, vec!["DatasetMetadata"]);
    assert_eq!(report.created, vec!["DataRelationship", "DomainTag"]);
    assert_eq!(store.count_all("DatasetMetadata"), Ok(0));
}

#[test]
fn keeping_existing_collections_preserves_objects() {
    let definitions = catalog();
    let store = MemoryStore::with_collections(&definitions);
    store
        .upsert("DomainTag", Uuid::from_u128(1), &Map::new())
        .expect("stored");

    let report = ensure_collections(&store, &definitions, |_| Existing::Keep).expect("ensured");
    assert_eq!(report.kept.len(), 3);
    assert_eq!(store.count_all("DomainTag"), Ok(1));
}

#[test]
fn missing_collections_are_listed_in_order() {
    let store = MemoryStore::with_collections(&catalog()[1..2]);
    assert_eq!(
        missing_collections(&store, &["DatasetMetadata", "DataRelationship", "DomainTag"]),
        Ok(vec!["DatasetMetadata".to_string(), "DomainTag".to_string()])
    );
}

#[test]
fn probe_finds_and_removes_its_record() {
    let store = MemoryStore::with_collections(&catalog());
    let report = probe(&store, "DatasetMetadata", Duration::ZERO).expect("probe ran");

    assert_eq!(report.queries.len(), PROBE_QUERIES.len());
    assert!(report.all_found(), "{:?}", report.queries);
    assert_eq!(store.count_all("DatasetMetadata"), Ok(0));
}

#[test]
fn probe_surfaces_store_failures() {
    let store = MemoryStore::with_collections(&catalog());
    store.fail_next_upsert(StoreError::timeout("vectorizer timed out"));

    let error = probe(&store, "DatasetMetadata", Duration::ZERO).expect_err("write failed");
    assert_eq!(error.kind, FailureKind::Timeout);
}
