use super::*;
use crate::schema::{Vectorizer, dataset_collection, relationship_collection};
use serde_json::json;

fn properties(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object literal")
}

fn catalog_store() -> MemoryStore {
    let vectorizer = Vectorizer::default();
    MemoryStore::with_collections(&[
        dataset_collection("DatasetMetadata", &vectorizer),
        relationship_collection("DataRelationship"),
    ])
}

#[test]
fn upsert_replaces_by_identifier() {
    let store = catalog_store();
    let id = Uuid::from_u128(7);

    store
        .upsert("DatasetMetadata", id, &properties(json!({ "recordCount": 500 })))
        .expect("first write");
    store
        .upsert("DatasetMetadata", id, &properties(json!({ "recordCount": 600 })))
        .expect("second write");

    assert_eq!(store.count_all("DatasetMetadata"), Ok(1));
    assert_eq!(
        store.get("DatasetMetadata", id).expect("stored")["recordCount"],
        json!(600)
    );
    assert_eq!(store.upsert_calls(), 2);
}

#[test]
fn missing_collection_is_a_client_error() {
    let store = MemoryStore::new();
    let error = store
        .upsert("Nope", Uuid::nil(), &Map::new())
        .expect_err("collection is missing");
    assert_eq!(error.kind, FailureKind::Client);
    assert_eq!(error.status, Some(404));
    assert_eq!(store.exists("Nope"), Ok(false));
}

#[test]
fn injected_failures_are_consumed_in_order() {
    let store = catalog_store();
    store.fail_next_upsert(StoreError::timeout("vectorizer timed out"));
    store.fail_next_upsert(StoreError::rejected("bad property"));

    let props = properties(json!({ "tableName": "orders" }));
    let first = store.upsert("DatasetMetadata", Uuid::nil(), &props);
    let second = store.upsert("DatasetMetadata", Uuid::nil(), &props);
    let third = store.upsert("DatasetMetadata", Uuid::nil(), &props);

    assert_eq!(first.map_err(|e| e.kind), Err(FailureKind::Timeout));
    assert_eq!(second.map_err(|e| e.kind), Err(FailureKind::Rejected));
    assert_eq!(third, Ok(Uuid::nil()));
}

#[test]
fn unreachable_store_fails_every_call() {
    let store = catalog_store();
    store.set_unreachable(true);
    assert_eq!(
        store.ready().map_err(|e| e.kind),
        Err(FailureKind::Connection)
    );
    assert!(store.list_collections().is_err());

    store.set_unreachable(false);
    assert!(store.ready().is_ok());
}

#[test]
fn connection_drops_after_served_upserts() {
    let store = catalog_store();
    store.disconnect_after(1);
    let record = properties(json!({ "tableName": "orders" }));

    assert!(store.upsert("DatasetMetadata", Uuid::from_u128(1), &record).is_ok());
    assert_eq!(
        store
            .upsert("DatasetMetadata", Uuid::from_u128(2), &record)
            .map_err(|e| e.kind),
        Err(FailureKind::Connection)
    );
    assert!(store.ready().is_err());
    assert_eq!(store.upsert_calls(), 1);

    store.set_unreachable(false);
    assert!(store.upsert("DatasetMetadata", Uuid::from_u128(2), &record).is_ok());
}

#[test]
fn keyword_search_uses_vectorized_properties() {
    let store = catalog_store();
    store
        .upsert(
            "DatasetMetadata",
            Uuid::from_u128(1),
            &properties(json!({
                "tableName": "customer_feedback",
                "description": "Customer satisfaction ratings",
                "tags": ["service quality"],
            })),
        )
        .expect("stored");
    store
        .upsert(
            "DatasetMetadata",
            Uuid::from_u128(2),
            &properties(json!({
                "tableName": "satisfaction",
                "description": "Quarterly revenue",
                "tags": ["finance"],
            })),
        )
        .expect("stored");

    let hits = store
        .fetch_by_query("DatasetMetadata", "customer satisfaction", 5)
        .expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, Uuid::from_u128(1));
    assert_eq!(hits[0].distance, Some(0.0));

    let tag_hits = store
        .fetch_by_query("DatasetMetadata", "Service", 5)
        .expect("search");
    assert_eq!(tag_hits.len(), 1);

    assert!(
        store
            .fetch_by_query("DatasetMetadata", "  ", 5)
            .expect("search")
            .is_empty()
    );
}

#[test]
fn unvectorized_collections_search_all_text() {
    let store = catalog_store();
    store
        .upsert(
            "DataRelationship",
            Uuid::from_u128(3),
            &properties(json!({ "fromTable": "orders", "toTable": "customers" })),
        )
        .expect("stored");

    let hits = store
        .fetch_by_query("DataRelationship", "orders", 10)
        .expect("search");
    assert_eq!(hits.len(), 1);
}

#[test]
fn collection_lifecycle() {
    let store = MemoryStore::new();
    let definition = relationship_collection("DataRelationship");

    store.create_collection(&definition).expect("created");
    let duplicate = store.create_collection(&definition).expect_err("duplicate");
    assert_eq!(duplicate.status, Some(422));

    store
        .upsert("DataRelationship", Uuid::from_u128(9), &Map::new())
        .expect("stored");
    assert_eq!(
        store
            .fetch_objects("DataRelationship", 10)
            .expect("fetch")
            .len(),
        1
    );

    store
        .delete_object("DataRelationship", Uuid::from_u128(9))
        .expect("deleted");
    store
        .delete_object("DataRelationship", Uuid::from_u128(9))
        .expect("deleting twice is fine");
    assert_eq!(store.count_all("DataRelationship"), Ok(0));

    store.delete_collection("DataRelationship").expect("dropped");
    assert_eq!(store.list_collections(), Ok(Vec::new()));
}
