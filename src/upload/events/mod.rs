use std::time::Duration;
use uuid::Uuid;

use super::UploadReport;
use crate::metadata::RecordKind;
use crate::store::StoreError;

/// Progress of an upload run, in the order it happens.
#[derive(Debug, Clone, Copy)]
pub enum UploadEvent<'a> {
    Started {
        kind: RecordKind,
        collection: &'a str,
        total: usize,
    },
    Invalid {
        index: usize,
        key: &'a str,
        errors: &'a [String],
    },
    Retrying {
        key: &'a str,
        attempt: u32,
        max_attempts: u32,
        error: &'a StoreError,
        backoff: Duration,
    },
    Stored {
        index: usize,
        key: &'a str,
        identifier: Uuid,
        attempts: u32,
    },
    Failed {
        index: usize,
        key: &'a str,
        error: &'a StoreError,
        attempts: u32,
    },
    Finished {
        report: &'a UploadReport,
    },
}

/// Receives [`UploadEvent`]s. Rendering is up to the implementation.
pub trait Reporter {
    fn event(&mut self, event: &UploadEvent<'_>);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    #[inline]
    fn event(&mut self, _event: &UploadEvent<'_>) {}
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    #[inline]
    fn event(&mut self, event: &UploadEvent<'_>) {
        (**self).event(event);
    }
}
