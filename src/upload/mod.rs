//! Upsert orchestration.
//!
//! Records are processed one at a time: validate, normalize, derive the
//! identifier, submit. A bad record or a failed submission is written into
//! the [`UploadReport`] and the run moves on. An unreachable store or a
//! missing collection stops the run before the first record. A connection
//! failure that the readiness probe confirms stops it mid-run.

#[cfg(test)]
mod tests;

pub mod events;
pub mod report;

use serde_json::{Map, Value};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{CollectionNames, Config};
use crate::metadata::{self, Normalizer, RawMetadata, RecordKind};
use crate::store::{FailureKind, StoreClient, StoreError};
use crate::{CatalogError, Result};

pub use events::{NullReporter, Reporter, UploadEvent};
pub use report::{FailureDetail, RunLedger, UploadFailure, UploadReport, UploadSuccess};

/// When and how often a failed submission is tried again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per record, including the first.
    pub max_attempts: u32,
    /// Fixed wait before each retry.
    pub backoff: Duration,
    /// Failure kinds worth another attempt.
    pub retry_on: Vec<FailureKind>,
    /// Wait between records.
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(5),
            retry_on: vec![FailureKind::Timeout],
            pause: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Policy that tries every submission exactly once.
    #[inline]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            retry_on: Vec::new(),
            ..Self::default()
        }
    }

    /// Whether a failure on attempt `attempt` (1-based) earns another try.
    #[inline]
    pub fn should_retry(&self, error: &StoreError, attempt: u32) -> bool {
        attempt < self.max_attempts && self.retry_on.contains(&error.kind)
    }
}

/// Submits catalog records to a store.
///
/// The ledger of stored natural keys lives as long as the uploader, so
/// relationships uploaded after datasets can be checked against them.
#[derive(Debug)]
pub struct Uploader<S> {
    store: S,
    normalizer: Normalizer,
    collections: CollectionNames,
    policy: RetryPolicy,
    ledger: RunLedger,
}

impl<S: StoreClient> Uploader<S> {
    #[inline]
    pub fn new(
        store: S,
        normalizer: Normalizer,
        collections: CollectionNames,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            normalizer,
            collections,
            policy,
            ledger: RunLedger::new(),
        }
    }

    /// Uploader with the configured profile, limits, collections and retry
    /// policy.
    #[inline]
    pub fn from_config(store: S, config: &Config) -> Self {
        Self::new(
            store,
            Normalizer::new(config.upload.profile, config.limits),
            config.collections.clone(),
            config.upload.retry_policy(),
        )
    }

    #[inline]
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    #[inline]
    pub fn into_ledger(self) -> RunLedger {
        self.ledger
    }

    /// Validate, normalize and submit every record of `kind`.
    ///
    /// Per-record problems end up in the report. An error is returned when
    /// the store cannot be reached or the target collection is missing, in
    /// which case nothing was submitted, or when the connection is lost
    /// mid-run, in which case the remaining records are not attempted.
    #[inline]
    pub fn upsert(
        &mut self,
        records: &[RawMetadata],
        kind: RecordKind,
        reporter: &mut dyn Reporter,
    ) -> Result<UploadReport> {
        let collection = self.collections.for_kind(kind).to_string();
        self.preflight(&collection)?;

        info!(
            "Uploading {} {} record(s) to {}",
            records.len(),
            kind,
            collection
        );
        reporter.event(&UploadEvent::Started {
            kind,
            collection: &collection,
            total: records.len(),
        });

        let mut report = UploadReport::new(kind, collection.as_str());
        let mut relationship_tables = Vec::new();

        for (index, raw) in records.iter().enumerate() {
            if index > 0 && !self.policy.pause.is_zero() {
                thread::sleep(self.policy.pause);
            }
            report.total_attempted += 1;

            if let Err(errors) = metadata::validate(raw, kind).into_result() {
                let key = raw.display_key(kind);
                warn!("Skipping invalid {} {}: {}", kind, key, errors.join("; "));
                reporter.event(&UploadEvent::Invalid {
                    index,
                    key: &key,
                    errors: &errors,
                });
                report.failed.push(UploadFailure {
                    key,
                    identifier: None,
                    detail: FailureDetail::Validation { errors },
                });
                continue;
            }

            let record = self.normalizer.normalize(raw, kind);
            let natural_key = record.natural_key();
            let identifier = natural_key.identifier();
            let key = natural_key.to_string();
            let properties = record.to_properties();

            let (outcome, attempts) =
                self.submit(&collection, identifier, &properties, &key, reporter);

            match outcome {
                Ok(stored) => {
                    debug!("Stored {} as {} after {} attempt(s)", key, stored, attempts);
                    reporter.event(&UploadEvent::Stored {
                        index,
                        key: &key,
                        identifier: stored,
                        attempts,
                    });
                    self.ledger.record(&natural_key, stored);
                    report.identifiers.insert(natural_key.canonical(), stored);
                    if let metadata::NormalizedRecord::Relationship(relationship) = &record {
                        relationship_tables.push(relationship.from_table.clone());
                        relationship_tables.push(relationship.to_table.clone());
                    }
                    report.succeeded.push(UploadSuccess {
                        key,
                        identifier: stored,
                        attempts,
                        payload_size: Value::Object(properties).to_string().len(),
                    });
                }
                Err(error) => {
                    warn!(
                        "Failed to store {} after {} attempt(s): {}",
                        key, attempts, error
                    );
                    reporter.event(&UploadEvent::Failed {
                        index,
                        key: &key,
                        error: &error,
                        attempts,
                    });
                    let lost_connection =
                        error.kind == FailureKind::Connection && self.store.ready().is_err();
                    report.failed.push(UploadFailure {
                        key,
                        identifier: Some(identifier),
                        detail: FailureDetail::Submission {
                            kind: error.kind,
                            message: error.message.clone(),
                            attempts,
                        },
                    });

                    // No remaining record can be stored without the store.
                    if lost_connection {
                        error!(
                            "Lost connection to the store after {} of {} record(s), {} stored",
                            index + 1,
                            records.len(),
                            report.succeeded_count()
                        );
                        reporter.event(&UploadEvent::Finished { report: &report });
                        return Err(CatalogError::Connection(format!(
                            "{} (stopped after {} of {} record(s), {} stored)",
                            error.message,
                            index + 1,
                            records.len(),
                            report.succeeded_count()
                        )));
                    }
                }
            }
        }

        if self.ledger.has_datasets() {
            report.unresolved_tables = self.unresolved(relationship_tables);
        }

        info!(
            "Finished {} upload: {} stored, {} failed",
            kind,
            report.succeeded_count(),
            report.failed_count()
        );
        reporter.event(&UploadEvent::Finished { report: &report });

        Ok(report)
    }

    /// Upload batches of several kinds in one run. Datasets go first, then
    /// relationships, then domain tags, whatever order `batches` lists them
    /// in, so relationships are checked against the datasets of this run.
    ///
    /// Stops at the first batch that returns an error.
    #[inline]
    pub fn upsert_all(
        &mut self,
        batches: &[(RecordKind, &[RawMetadata])],
        reporter: &mut dyn Reporter,
    ) -> Result<Vec<UploadReport>> {
        let mut ordered: Vec<_> = batches.iter().collect();
        ordered.sort_by_key(|(kind, _)| *kind);

        let mut reports = Vec::with_capacity(ordered.len());
        for (kind, records) in ordered {
            reports.push(self.upsert(records, *kind, reporter)?);
        }
        Ok(reports)
    }

    fn preflight(&self, collection: &str) -> Result<()> {
        self.store
            .ready()
            .map_err(|e| CatalogError::Connection(e.message))?;

        match self.store.exists(collection) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CatalogError::MissingCollection(collection.to_string())),
            Err(e) if e.kind == FailureKind::Connection => {
                Err(CatalogError::Connection(e.message))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Submit one record, retrying as the policy allows. Returns the final
    /// outcome and the number of attempts made.
    fn submit(
        &self,
        collection: &str,
        identifier: Uuid,
        properties: &Map<String, Value>,
        key: &str,
        reporter: &mut dyn Reporter,
    ) -> (std::result::Result<Uuid, StoreError>, u32) {
        let mut attempt = 1;
        loop {
            match self.store.upsert(collection, identifier, properties) {
                Ok(stored) => return (Ok(stored), attempt),
                Err(error) if self.policy.should_retry(&error, attempt) => {
                    warn!(
                        "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                        attempt, self.policy.max_attempts, key, error, self.policy.backoff
                    );
                    reporter.event(&UploadEvent::Retrying {
                        key,
                        attempt,
                        max_attempts: self.policy.max_attempts,
                        error: &error,
                        backoff: self.policy.backoff,
                    });
                    if !self.policy.backoff.is_zero() {
                        thread::sleep(self.policy.backoff);
                    }
                    attempt += 1;
                }
                Err(error) => return (Err(error), attempt),
            }
        }
    }

    fn unresolved(&self, tables: Vec<String>) -> Vec<String> {
        let mut unresolved: Vec<String> = tables
            .into_iter()
            .filter(|table| !self.ledger.covers_table(table))
            .collect();
        unresolved.sort();
        unresolved.dedup();
        unresolved
    }
}
