
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::metadata::{NaturalKey, RecordKind};
use crate::store::FailureKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSuccess {
    pub key: String,
    pub identifier: Uuid,
    pub attempts: u32,
    /// Serialized size of the stored properties in bytes.
    pub payload_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    pub key: String,
    /// Absent when the record never got far enough to have one.
    pub identifier: Option<Uuid>,
    pub detail: FailureDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum FailureDetail {
    Validation {
        errors: Vec<String>,
    },
    Submission {
        kind: FailureKind,
        message: String,
        attempts: u32,
    },
}

impl FailureDetail {
    /// One-line description for console output.
    #[inline]
    pub fn summary(&self) -> String {
        match self {
            FailureDetail::Validation { errors } => errors.join("; "),
            FailureDetail::Submission {
                kind,
                message,
                attempts,
            } => format!("{kind} error after {attempts} attempt(s): {message}"),
        }
    }
}

/// Outcome of one [`Uploader::upsert`](super::Uploader::upsert) call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub kind: RecordKind,
    pub collection: String,
    pub total_attempted: usize,
    pub succeeded: Vec<UploadSuccess>,
    pub failed: Vec<UploadFailure>,
    /// Canonical natural key to identifier, for every stored record.
    pub identifiers: BTreeMap<String, Uuid>,
    /// Tables named by stored relationships that no dataset in the run
    /// ledger covers. Only filled when the ledger knows some datasets.
    pub unresolved_tables: Vec<String>,
}

impl UploadReport {
    #[inline]
    pub fn new(kind: RecordKind, collection: impl Into<String>) -> Self {
        Self {
            kind,
            collection: collection.into(),
            total_attempted: 0,
            succeeded: Vec::new(),
            failed: Vec::new(),
            identifiers: BTreeMap::new(),
            unresolved_tables: Vec::new(),
        }
    }

    #[inline]
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    #[inline]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Failures that happened while talking to the store, as opposed to
    /// records that were invalid to begin with.
    #[inline]
    pub fn submission_failures(&self) -> impl Iterator<Item = &UploadFailure> {
        self.failed
            .iter()
            .filter(|f| matches!(f.detail, FailureDetail::Submission { .. }))
    }

    /// Total serialized size of everything stored.
    #[inline]
    pub fn payload_bytes(&self) -> usize {
        self.succeeded.iter().map(|s| s.payload_size).sum()
    }
}

/// Natural keys and identifiers of everything stored by one uploader,
/// across all of its `upsert` calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunLedger {
    identifiers: BTreeMap<String, Uuid>,
    tables: BTreeSet<String>,
}

impl RunLedger {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&mut self, key: &NaturalKey, identifier: Uuid) {
        if let NaturalKey::Dataset { table_name, .. } = key {
            self.tables.insert(table_name.to_lowercase());
        }
        self.identifiers.insert(key.canonical(), identifier);
    }

    #[inline]
    pub fn identifier(&self, key: &NaturalKey) -> Option<Uuid> {
        self.identifiers.get(&key.canonical()).copied()
    }

    /// Whether a dataset with this table name, in any zone, was stored.
    #[inline]
    pub fn covers_table(&self, table_name: &str) -> bool {
        self.tables.contains(&table_name.to_lowercase())
    }

    #[inline]
    pub fn has_datasets(&self) -> bool {
        !self.tables.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, Uuid)> {
        self.identifiers.iter().map(|(key, id)| (key.as_str(), *id))
    }
}
