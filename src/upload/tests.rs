use super::*;
use crate::schema::{Vectorizer, dataset_collection, domain_tag_collection, relationship_collection};
use crate::store::MemoryStore;
use chrono::{TimeZone, Utc};
use serde_json::json;

fn catalog_store() -> MemoryStore {
    let vectorizer = Vectorizer::default();
    MemoryStore::with_collections(&[
        dataset_collection("DatasetMetadata", &vectorizer),
        relationship_collection("DataRelationship"),
        domain_tag_collection("DomainTag", &vectorizer),
    ])
}

fn quick_policy() -> RetryPolicy {
    RetryPolicy {
        backoff: Duration::ZERO,
        ..RetryPolicy::default()
    }
}

fn uploader(store: &MemoryStore, policy: RetryPolicy) -> Uploader<&MemoryStore> {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().expect("valid instant");
    Uploader::new(
        store,
        Normalizer::default().at(now),
        CollectionNames::default(),
        policy,
    )
}

fn raw(value: Value) -> RawMetadata {
    RawMetadata::from_value(value).expect("object literal")
}

fn orders(record_count: u64) -> RawMetadata {
    raw(json!({
        "tableName": "orders",
        "zone": "Raw",
        "originalFileName": "orders.csv",
        "recordCount": record_count,
        "columnsArray": ["id", "amount"],
        "detailedColumnInfo": "{\"columns\":[]}",
    }))
}

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl Reporter for Recorder {
    fn event(&mut self, event: &UploadEvent<'_>) {
        let line = match event {
            UploadEvent::Started { total, .. } => format!("started {total}"),
            UploadEvent::Invalid { key, .. } => format!("invalid {key}"),
            UploadEvent::Retrying { attempt, .. } => format!("retrying {attempt}"),
            UploadEvent::Stored { key, attempts, .. } => format!("stored {key} {attempts}"),
            UploadEvent::Failed { key, .. } => format!("failed {key}"),
            UploadEvent::Finished { report } => {
                format!("finished {}/{}", report.succeeded_count(), report.total_attempted)
            }
        };
        self.events.push(line);
    }
}

#[test]
fn one_valid_and_one_invalid_record() {
    let store = catalog_store();
    let mut uploader = uploader(&store, quick_policy());

    let mut missing_zone = orders(10);
    missing_zone.insert("zone", Value::Null);
    missing_zone.insert("tableName", json!("customers"));

    let mut recorder = Recorder::default();
    let report = uploader
        .upsert(&[orders(500), missing_zone], RecordKind::Dataset, &mut recorder)
        .expect("store is reachable");

    assert_eq!(report.total_attempted, 2);
    assert_eq!(report.succeeded_count(), 1);
    assert_eq!(report.failed_count(), 1);

    let failure = &report.failed[0];
    assert_eq!(failure.identifier, None);
    assert!(matches!(
        &failure.detail,
        FailureDetail::Validation { errors } if errors.iter().any(|e| e.contains("zone"))
    ));

    let expected = crate::metadata::identifier_for_canonical("orders_raw");
    assert_eq!(report.succeeded[0].identifier, expected);
    assert_eq!(report.identifiers.get("orders_raw"), Some(&expected));
    assert!(report.succeeded[0].payload_size > 0);

    assert_eq!(
        recorder.events,
        vec![
            "started 2",
            "stored orders (Raw) 1",
            "invalid customers (?)",
            "finished 1/2",
        ]
    );
}

#[test]
fn duplicate_natural_key_keeps_latest_values() {
    let store = catalog_store();
    let mut uploader = uploader(&store, quick_policy());

    let first = uploader
        .upsert(&[orders(100)], RecordKind::Dataset, &mut NullReporter)
        .expect("store is reachable");
    let second = uploader
        .upsert(&[orders(250)], RecordKind::Dataset, &mut NullReporter)
        .expect("store is reachable");

    assert_eq!(first.succeeded[0].identifier, second.succeeded[0].identifier);
    assert_eq!(store.count_all("DatasetMetadata").expect("count"), 1);

    let stored = store
        .get("DatasetMetadata", second.succeeded[0].identifier)
        .expect("record stored");
    assert_eq!(stored.get("recordCount"), Some(&json!(250)));
    assert_eq!(uploader.ledger().len(), 1);
}

#[test]
fn timeouts_are_retried() {
    let store = catalog_store();
    store.fail_next_upsert(StoreError::timeout("vectorizer timed out"));
    let mut uploader = uploader(&store, quick_policy());

    let mut recorder = Recorder::default();
    let report = uploader
        .upsert(&[orders(1)], RecordKind::Dataset, &mut recorder)
        .expect("store is reachable");

    assert_eq!(report.succeeded_count(), 1);
    assert_eq!(report.succeeded[0].attempts, 2);
    assert_eq!(store.upsert_calls(), 2);
    assert!(recorder.events.contains(&"retrying 1".to_string()));
}

#[test]
fn retries_are_bounded() {
    let store = catalog_store();
    for _ in 0..3 {
        store.fail_next_upsert(StoreError::timeout("still slow"));
    }
    let mut uploader = uploader(&store, quick_policy());

    let report = uploader
        .upsert(&[orders(1)], RecordKind::Dataset, &mut NullReporter)
        .expect("store is reachable");

    assert_eq!(store.upsert_calls(), 2);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(
        report.failed[0].detail,
        FailureDetail::Submission {
            kind: FailureKind::Timeout,
            message: "still slow".to_string(),
            attempts: 2,
        }
    );
    assert_eq!(
        report.failed[0].identifier,
        Some(crate::metadata::identifier_for_canonical("orders_raw"))
    );
    assert_eq!(report.submission_failures().count(), 1);
}

#[test]
fn other_failures_are_not_retried() {
    let store = catalog_store();
    store.fail_next_upsert(StoreError::rejected("invalid property"));
    let mut uploader = uploader(&store, quick_policy());

    let report = uploader
        .upsert(&[orders(1), orders(2)], RecordKind::Dataset, &mut NullReporter)
        .expect("store is reachable");

    assert_eq!(store.upsert_calls(), 2);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.succeeded_count(), 1);
    assert!(matches!(
        report.failed[0].detail,
        FailureDetail::Submission {
            kind: FailureKind::Rejected,
            attempts: 1,
            ..
        }
    ));
}

#[test]
fn configured_kinds_are_retried() {
    let store = catalog_store();
    store.fail_next_upsert(StoreError::new(FailureKind::Server, "busy").with_status(503));
    let policy = RetryPolicy {
        retry_on: vec![FailureKind::Timeout, FailureKind::Server],
        ..quick_policy()
    };
    let mut uploader = uploader(&store, policy);

    let report = uploader
        .upsert(&[orders(1)], RecordKind::Dataset, &mut NullReporter)
        .expect("store is reachable");

    assert_eq!(report.succeeded[0].attempts, 2);
}

#[test]
fn unreachable_store_is_fatal() {
    let store = catalog_store();
    store.set_unreachable(true);
    let mut uploader = uploader(&store, quick_policy());

    let result = uploader.upsert(&[orders(1)], RecordKind::Dataset, &mut NullReporter);
    assert!(matches!(result, Err(CatalogError::Connection(_))));
    assert_eq!(store.upsert_calls(), 0);
}

#[test]
fn lost_connection_stops_the_run() {
    let store = catalog_store();
    store.disconnect_after(1);
    let mut uploader = uploader(&store, quick_policy());
    let mut recorder = Recorder::default();

    let result = uploader.upsert(
        &[orders(1), orders(2), orders(3)],
        RecordKind::Dataset,
        &mut recorder,
    );

    assert!(matches!(
        &result,
        Err(CatalogError::Connection(message)) if message.contains("stopped after 2 of 3")
    ));
    assert_eq!(store.upsert_calls(), 1);
    assert_eq!(
        recorder.events,
        vec![
            "started 3",
            "stored orders (Raw) 1",
            "failed orders (Raw)",
            "finished 1/2",
        ]
    );
    assert!(uploader.ledger().has_datasets());
}

#[test]
fn connection_blip_with_ready_store_continues() {
    let store = catalog_store();
    store.fail_next_upsert(StoreError::connection("connection reset by peer"));
    let mut uploader = uploader(&store, quick_policy());

    let report = uploader
        .upsert(&[orders(1), orders(2)], RecordKind::Dataset, &mut NullReporter)
        .expect("store answers its readiness probe");

    assert_eq!(store.upsert_calls(), 2);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.succeeded_count(), 1);
}

#[test]
fn missing_collection_is_fatal() {
    let store = MemoryStore::new();
    let mut uploader = uploader(&store, quick_policy());

    let result = uploader.upsert(&[orders(1)], RecordKind::Dataset, &mut NullReporter);
    assert!(matches!(
        result,
        Err(CatalogError::MissingCollection(name)) if name == "DatasetMetadata"
    ));
}

#[test]
fn relationships_are_checked_against_stored_datasets() {
    let store = catalog_store();
    let mut uploader = uploader(&store, quick_policy());

    uploader
        .upsert(&[orders(1)], RecordKind::Dataset, &mut NullReporter)
        .expect("store is reachable");

    let relationship = raw(json!({
        "from_table": "Orders",
        "from_column": "customer_id",
        "to_table": "customers",
        "to_column": "id",
    }));
    let report = uploader
        .upsert(&[relationship], RecordKind::Relationship, &mut NullReporter)
        .expect("store is reachable");

    assert_eq!(report.collection, "DataRelationship");
    assert_eq!(report.succeeded[0].key, "Orders.customer_id -> customers.id");
    assert_eq!(report.unresolved_tables, vec!["customers".to_string()]);
    assert!(
        report
            .identifiers
            .contains_key("orders.customer_id_to_customers.id")
    );
    assert_eq!(uploader.ledger().len(), 2);
}

#[test]
fn relationships_alone_are_not_checked() {
    let store = catalog_store();
    let mut uploader = uploader(&store, quick_policy());

    let relationship = raw(json!({
        "fromTable": "orders",
        "fromColumn": "customer_id",
        "toTable": "customers",
        "toColumn": "id",
    }));
    let report = uploader
        .upsert(&[relationship], RecordKind::Relationship, &mut NullReporter)
        .expect("store is reachable");

    assert!(report.unresolved_tables.is_empty());
}

#[test]
fn combined_run_uploads_datasets_first() {
    let store = catalog_store();
    let mut uploader = uploader(&store, quick_policy());
    let mut recorder = Recorder::default();

    let relationships = [raw(json!({
        "fromTable": "orders",
        "fromColumn": "product_id",
        "toTable": "products",
        "toColumn": "id",
    }))];
    let tags = [raw(json!({"tagName": "Sales"}))];
    let datasets = [orders(1)];

    let reports = uploader
        .upsert_all(
            &[
                (RecordKind::DomainTag, &tags[..]),
                (RecordKind::Relationship, &relationships[..]),
                (RecordKind::Dataset, &datasets[..]),
            ],
            &mut recorder,
        )
        .expect("store is reachable");

    let kinds: Vec<RecordKind> = reports.iter().map(|report| report.kind).collect();
    assert_eq!(
        kinds,
        vec![RecordKind::Dataset, RecordKind::Relationship, RecordKind::DomainTag]
    );
    assert_eq!(reports[1].unresolved_tables, vec!["products".to_string()]);
    assert!(reports.iter().all(UploadReport::is_complete));
    assert_eq!(recorder.events.first().map(String::as_str), Some("started 1"));
    assert_eq!(store.upsert_calls(), 3);
}

#[test]
fn combined_run_stops_at_missing_collection() {
    let vectorizer = Vectorizer::default();
    let store = MemoryStore::with_collections(&[dataset_collection("DatasetMetadata", &vectorizer)]);
    let mut uploader = uploader(&store, quick_policy());

    let relationships = [raw(json!({
        "fromTable": "orders",
        "fromColumn": "customer_id",
        "toTable": "customers",
        "toColumn": "id",
    }))];
    let datasets = [orders(1)];
    let result = uploader.upsert_all(
        &[
            (RecordKind::Relationship, &relationships[..]),
            (RecordKind::Dataset, &datasets[..]),
        ],
        &mut NullReporter,
    );

    assert!(matches!(result, Err(CatalogError::MissingCollection(name)) if name == "DataRelationship"));
    assert_eq!(store.upsert_calls(), 1);
}

#[test]
fn domain_tags_use_their_collection() {
    let store = catalog_store();
    let mut uploader = uploader(&store, quick_policy());

    let report = uploader
        .upsert(
            &[
                raw(json!({"tag_name": "Finance", "business_priority": "high"})),
                raw(json!({"tagName": "Customer", "businessPriority": "urgent"})),
            ],
            RecordKind::DomainTag,
            &mut NullReporter,
        )
        .expect("store is reachable");

    assert_eq!(report.succeeded_count(), 1);
    assert_eq!(report.failed_count(), 1);

    let stored = store
        .get("DomainTag", crate::metadata::identifier_for_canonical("finance"))
        .expect("tag stored");
    assert_eq!(stored.get("businessPriority"), Some(&json!("High")));
}

#[test]
fn retry_policy_decisions() {
    let policy = RetryPolicy::default();
    let timeout = StoreError::timeout("slow");
    assert!(policy.should_retry(&timeout, 1));
    assert!(!policy.should_retry(&timeout, 2));
    assert!(!policy.should_retry(&StoreError::connection("down"), 1));

    let none = RetryPolicy::no_retry();
    assert!(!none.should_retry(&timeout, 1));
}
