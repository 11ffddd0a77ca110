#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Descriptor files on disk through normalization into an in-memory store.

use anyhow::Result;
use catalog_kb::commands::{CatalogPaths, load_catalog, upload_catalog};
use catalog_kb::config::Config;
use catalog_kb::metadata::{Profile, RecordKind, identifier_for_canonical};
use catalog_kb::query;
use catalog_kb::schema::{self, Existing, collection_for};
use catalog_kb::sources;
use catalog_kb::store::{MemoryStore, StoreClient};
use catalog_kb::upload::{NullReporter, Uploader};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

const ORDERS: &str = r#"
tableName: orders
originalFileName: orders.csv
zone: Raw
format: CSV
description: Customer orders with totals and shipping dates
recordCount: 1500
columnsArray: [order_id, customer_id, order_total, shipped_date]
detailedColumnInfo:
  columns:
    - name: order_id
      type: int
      description: Order identifier
    - name: customer_id
      type: int
      description: Customer placing the order
tags: [sales, orders]
"#;

const CUSTOMERS: &str = r#"
datasets:
  - tableName: customers
    originalFileName: customers.csv
    zone: Curated
    description: Customer contact details
    recordCount: 300
    columnsArray: [customer_id, email, phone]
    detailedColumnInfo: {"columns": [{"name": "email", "description": "Contact address"}]}
  - tableName: customers
    originalFileName: customers.csv
    zone: Bronze
    recordCount: 1
    columnsArray: [customer_id]
    detailedColumnInfo: {}
"#;

const RELATIONSHIPS: &str = r#"
relationships:
  - fromTable: orders
    fromColumn: customer_id
    toTable: customers
    toColumn: customer_id
    relationshipType: foreign_key
    cardinality: many-to-one
  - fromTable: orders
    fromColumn: product_id
    toTable: products
    toColumn: product_id
"#;

const TAGS: &str = r#"
domain_tags:
  - tagName: Sales
    tagDescription: Revenue and order data
    businessPriority: high
    dataSensitivity: internal
  - tagName: Support
    businessPriority: urgent
"#;

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn catalog_store(config: &Config) -> Result<MemoryStore> {
    let store = MemoryStore::new();
    let definitions: Vec<_> = [RecordKind::Dataset, RecordKind::Relationship, RecordKind::DomainTag]
        .into_iter()
        .map(|kind| collection_for(kind, config.collections.for_kind(kind), &config.vectorizer))
        .collect();
    let report = schema::ensure_collections(&store, &definitions, |_| Existing::Keep)?;
    assert_eq!(report.created.len(), 3);
    Ok(store)
}

fn descriptor_dir() -> Result<TempDir> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("orders.yaml"), ORDERS)?;
    fs::write(dir.path().join("customers.yml"), CUSTOMERS)?;
    fs::write(dir.path().join("notes.txt"), "not a descriptor")?;
    fs::write(dir.path().join("relationships.yaml"), RELATIONSHIPS)?;
    fs::write(dir.path().join("tags.yaml"), TAGS)?;
    Ok(dir)
}

#[test]
fn catalog_round_trip() -> Result<()> {
    init_test_tracing();
    let dir = descriptor_dir()?;
    let config = Config::with_base_dir(dir.path());
    let store = catalog_store(&config)?;

    let datasets = sources::load_file(&dir.path().join("orders.yaml"), RecordKind::Dataset)?
        .into_iter()
        .chain(sources::load_file(
            &dir.path().join("customers.yml"),
            RecordKind::Dataset,
        )?)
        .collect::<Vec<_>>();
    assert_eq!(datasets.len(), 3);

    let mut uploader = Uploader::from_config(&store, &config);
    let report = uploader.upsert(&datasets, RecordKind::Dataset, &mut NullReporter)?;
    assert_eq!(report.succeeded_count(), 2);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.failed[0].key, "customers (Bronze)");
    assert_eq!(
        report.identifiers.get("orders_raw"),
        Some(&identifier_for_canonical("orders_raw"))
    );

    let relationships = sources::load(&dir.path().join("relationships.yaml"), RecordKind::Relationship)?;
    let report = uploader.upsert(&relationships, RecordKind::Relationship, &mut NullReporter)?;
    assert!(report.is_complete());
    assert_eq!(report.unresolved_tables, vec!["products".to_string()]);

    let tags = sources::load(&dir.path().join("tags.yaml"), RecordKind::DomainTag)?;
    let report = uploader.upsert(&tags, RecordKind::DomainTag, &mut NullReporter)?;
    assert_eq!(report.succeeded_count(), 1);
    assert_eq!(report.failed_count(), 1);

    let statuses = query::verify(&store, &config.collections);
    let counts: Vec<Option<u64>> = statuses
        .iter()
        .map(|status| status.outcome.as_ref().ok().map(|sample| sample.count))
        .collect();
    assert_eq!(counts, vec![Some(2), Some(2), Some(1)]);

    let hits = query::search(&store, &config.collections.datasets, "customer email", 3)?;
    assert!(hits.iter().any(|hit| hit.table_name == "customers"
        && hit.relevant_columns.contains(&"email".to_string())));
    Ok(())
}

#[test]
fn reingesting_the_same_descriptors_is_idempotent() -> Result<()> {
    init_test_tracing();
    let dir = descriptor_dir()?;
    let config = Config::with_base_dir(dir.path());
    let store = catalog_store(&config)?;

    let orders = sources::load(&dir.path().join("orders.yaml"), RecordKind::Dataset)?;
    let first = Uploader::from_config(&store, &config).upsert(
        &orders,
        RecordKind::Dataset,
        &mut NullReporter,
    )?;
    let second = Uploader::from_config(&store, &config).upsert(
        &orders,
        RecordKind::Dataset,
        &mut NullReporter,
    )?;

    assert_eq!(first.identifiers, second.identifiers);
    assert_eq!(store.count_all(&config.collections.datasets)?, 1);
    Ok(())
}

#[test]
fn compact_profile_bounds_stored_text() -> Result<()> {
    init_test_tracing();
    let dir = TempDir::new()?;
    let long_description = "word ".repeat(400);
    let descriptor = json!({
        "tableName": "events",
        "originalFileName": "events.csv",
        "zone": "Cleansed",
        "description": long_description,
        "recordCount": 5,
        "columnsArray": ["id"],
        "detailedColumnInfo": {"columns": [{"name": "id"}]},
        "answerableQuestions": ["Which events happened yesterday?"],
    });
    fs::write(dir.path().join("events.json"), descriptor.to_string())?;

    let mut config = Config::with_base_dir(dir.path());
    config.upload.profile = Profile::Compact;
    let store = catalog_store(&config)?;

    let records = sources::load(dir.path(), RecordKind::Dataset)?;
    let report = Uploader::from_config(&store, &config).upsert(
        &records,
        RecordKind::Dataset,
        &mut NullReporter,
    )?;
    assert!(report.is_complete());

    let id = report.identifiers["events_cleansed"];
    let stored = store
        .get(&config.collections.datasets, id)
        .ok_or_else(|| anyhow::anyhow!("events not stored"))?;
    let description = stored["description"].as_str().unwrap_or_default();
    assert!(description.chars().count() <= config.limits.description);
    assert!(description.ends_with("..."));
    Ok(())
}

#[test]
fn combined_upload_reports_unresolved_tables() -> Result<()> {
    init_test_tracing();
    let dir = descriptor_dir()?;
    let datasets = dir.path().join("datasets");
    fs::create_dir(&datasets)?;
    fs::write(datasets.join("orders.yaml"), ORDERS)?;
    fs::write(datasets.join("customers.yml"), CUSTOMERS)?;
    let config = Config::with_base_dir(dir.path());
    let store = catalog_store(&config)?;

    let relationships = dir.path().join("relationships.yaml");
    let tags = dir.path().join("tags.yaml");
    let batches = load_catalog(CatalogPaths {
        datasets: &datasets,
        relationships: Some(&relationships),
        tags: Some(&tags),
    })?;
    assert_eq!(batches.len(), 3);

    let reports = upload_catalog(&store, &config, &batches, &mut NullReporter)?;
    let kinds: Vec<RecordKind> = reports.iter().map(|report| report.kind).collect();
    assert_eq!(
        kinds,
        vec![RecordKind::Dataset, RecordKind::Relationship, RecordKind::DomainTag]
    );
    assert_eq!(reports[0].succeeded_count(), 2);
    assert_eq!(reports[1].unresolved_tables, vec!["products".to_string()]);
    assert_eq!(reports[2].succeeded_count(), 1);
    assert_eq!(store.count_all(&config.collections.relationships)?, 2);
    Ok(())
}

#[test]
fn combined_upload_without_optional_files() -> Result<()> {
    init_test_tracing();
    let dir = descriptor_dir()?;
    let config = Config::with_base_dir(dir.path());
    let store = catalog_store(&config)?;

    let batches = load_catalog(CatalogPaths {
        datasets: &dir.path().join("orders.yaml"),
        relationships: None,
        tags: None,
    })?;
    let reports = upload_catalog(&store, &config, &batches, &mut NullReporter)?;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_complete());
    assert!(reports[0].unresolved_tables.is_empty());
    Ok(())
}
