use super::*;
use serde_json::json;

#[test]
fn failure_kinds_round_trip_through_text() {
    for kind in FailureKind::ALL {
        assert_eq!(kind.as_str().parse::<FailureKind>(), Ok(kind));
        assert_eq!(
            serde_json::to_value(kind).expect("serializes"),
            json!(kind.as_str())
        );
    }
    assert_eq!(" Timeout ".parse::<FailureKind>(), Ok(FailureKind::Timeout));
    assert!("flaky".parse::<FailureKind>().is_err());
}

#[test]
fn store_error_display() {
    let error = StoreError::new(FailureKind::Server, "boom").with_status(503);
    assert_eq!(error.to_string(), "server error: boom");
    assert_eq!(error.status, Some(503));
    assert_eq!(StoreError::timeout("slow").kind, FailureKind::Timeout);
}

#[test]
fn stored_object_accessors() {
    let object = StoredObject {
        id: Uuid::nil(),
        properties: json!({
            "tableName": "orders",
            "tags": ["sales", 3, "orders"],
            "recordCount": 500,
        })
        .as_object()
        .cloned()
        .expect("object literal"),
        distance: None,
    };

    assert_eq!(object.text("tableName"), "orders");
    assert_eq!(object.text("missing"), "");
    assert_eq!(object.text_list("tags"), vec!["sales", "orders"]);
    assert!(object.text_list("tableName").is_empty());
    assert_eq!(object.integer("recordCount"), Some(500));
}

#[test]
fn references_are_clients() {
    fn collections<S: StoreClient>(store: S) -> Vec<String> {
        store.list_collections().expect("memory store never fails here")
    }

    let store = MemoryStore::new();
    store
        .create_collection(&crate::schema::domain_tag_collection(
            "DomainTag",
            &crate::schema::Vectorizer::default(),
        ))
        .expect("creates");
    assert_eq!(collections(&store), vec!["DomainTag"]);
}
