//! Vector store access.
//!
//! [`StoreClient`] is the seam between the catalog logic and the external
//! store. Every call may be slow or fail; failures carry a [`FailureKind`]
//! chosen by the adapter so callers never have to inspect message text.

#[cfg(test)]
mod tests;

pub mod memory;
pub mod weaviate;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::schema::CollectionDef;

pub use memory::MemoryStore;
pub use weaviate::WeaviateClient;

/// Classification of a failed store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The call or the vectorizer behind it ran out of time.
    Timeout,
    /// The store could not be reached.
    Connection,
    /// The store answered with a 5xx status.
    Server,
    /// The store answered with a 4xx status.
    Client,
    /// The request was accepted but the object was refused.
    Rejected,
    /// The response could not be understood.
    Decode,
}

impl FailureKind {
    pub const ALL: [FailureKind; 6] = [
        FailureKind::Timeout,
        FailureKind::Connection,
        FailureKind::Server,
        FailureKind::Client,
        FailureKind::Rejected,
        FailureKind::Decode,
    ];

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection",
            FailureKind::Server => "server",
            FailureKind::Client => "client",
            FailureKind::Rejected => "rejected",
            FailureKind::Decode => "decode",
        }
    }
}

impl fmt::Display for FailureKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureKind {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        FailureKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "Unknown failure kind '{}' (expected one of: {})",
                    s,
                    FailureKind::ALL.map(FailureKind::as_str).join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct StoreError {
    pub kind: FailureKind,
    pub message: String,
    /// HTTP status, when the store answered at all.
    pub status: Option<u16>,
}

impl StoreError {
    #[inline]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    #[inline]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[inline]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Connection, message)
    }

    #[inline]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Rejected, message)
    }

    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Decode, message)
    }
}

/// An object read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: Uuid,
    pub properties: Map<String, Value>,
    /// Vector distance to the query, for similarity searches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

impl StoredObject {
    /// Text value of a property, or `""`.
    #[inline]
    pub fn text(&self, property: &str) -> &str {
        self.properties
            .get(property)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Strings of a text-array property; non-string entries are skipped.
    #[inline]
    pub fn text_list(&self, property: &str) -> Vec<String> {
        match self.properties.get(property) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    #[inline]
    pub fn integer(&self, property: &str) -> Option<i64> {
        self.properties.get(property).and_then(Value::as_i64)
    }
}

/// Operations the catalog needs from a vector store.
///
/// `upsert` creates the object or replaces the one stored under the same
/// identifier, which is what makes re-ingestion idempotent.
pub trait StoreClient {
    /// Readiness probe.
    fn ready(&self) -> Result<(), StoreError>;

    fn exists(&self, collection: &str) -> Result<bool, StoreError>;

    fn upsert(
        &self,
        collection: &str,
        id: Uuid,
        properties: &Map<String, Value>,
    ) -> Result<Uuid, StoreError>;

    /// Similarity search over the collection's vectorized text.
    fn fetch_by_query(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<StoredObject>, StoreError>;

    fn count_all(&self, collection: &str) -> Result<u64, StoreError>;

    /// Up to `limit` objects in store order.
    fn fetch_objects(&self, collection: &str, limit: usize) -> Result<Vec<StoredObject>, StoreError>;

    fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    fn create_collection(&self, definition: &CollectionDef) -> Result<(), StoreError>;

    fn delete_collection(&self, collection: &str) -> Result<(), StoreError>;

    /// Removing an object that is not there is not an error.
    fn delete_object(&self, collection: &str, id: Uuid) -> Result<(), StoreError>;
}

impl<S: StoreClient + ?Sized> StoreClient for &S {
    #[inline]
    fn ready(&self) -> Result<(), StoreError> {
        (**self).ready()
    }

    #[inline]
    fn exists(&self, collection: &str) -> Result<bool, StoreError> {
        (**self).exists(collection)
    }

    #[inline]
    fn upsert(
        &self,
        collection: &str,
        id: Uuid,
        properties: &Map<String, Value>,
    ) -> Result<Uuid, StoreError> {
        (**self).upsert(collection, id, properties)
    }

    #[inline]
    fn fetch_by_query(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<StoredObject>, StoreError> {
        (**self).fetch_by_query(collection, query, limit)
    }

    #[inline]
    fn count_all(&self, collection: &str) -> Result<u64, StoreError> {
        (**self).count_all(collection)
    }

    #[inline]
    fn fetch_objects(&self, collection: &str, limit: usize) -> Result<Vec<StoredObject>, StoreError> {
        (**self).fetch_objects(collection, limit)
    }

    #[inline]
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        (**self).list_collections()
    }

    #[inline]
    fn create_collection(&self, definition: &CollectionDef) -> Result<(), StoreError> {
        (**self).create_collection(definition)
    }

    #[inline]
    fn delete_collection(&self, collection: &str) -> Result<(), StoreError> {
        (**self).delete_collection(collection)
    }

    #[inline]
    fn delete_object(&self, collection: &str, id: Uuid) -> Result<(), StoreError> {
        (**self).delete_object(collection, id)
    }
}
