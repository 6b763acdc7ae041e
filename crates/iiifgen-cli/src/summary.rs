//! Run accounting
//!
//! [`RunSummary`] is the only structure written concurrently during a
//! run; all counters are atomic so worker futures can record outcomes
//! without coordination and without double-counting.

use crate::record::RejectReason;
use crate::resolver::{ImageDescriptor, ResolutionStatus};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one pipeline execution
#[derive(Debug, Default)]
pub struct RunSummary {
    records_read: AtomicU64,
    records_rejected: AtomicU64,
    rejected_missing_catalog_number: AtomicU64,
    rejected_missing_required_field: AtomicU64,
    rejected_no_media_uri: AtomicU64,
    rejected_unreadable_row: AtomicU64,
    images_resolved: AtomicU64,
    images_failed: AtomicU64,
    images_skipped: AtomicU64,
    records_without_usable_images: AtomicU64,
    manifests_written: AtomicU64,
    manifests_skipped: AtomicU64,
    write_errors: AtomicU64,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self) {
        self.records_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, reason: &RejectReason) {
        self.records_rejected.fetch_add(1, Ordering::Relaxed);
        let counter = match reason {
            RejectReason::MissingCatalogNumber => &self.rejected_missing_catalog_number,
            RejectReason::MissingRequiredField(_) => &self.rejected_missing_required_field,
            RejectReason::NoMediaUri => &self.rejected_no_media_uri,
            RejectReason::UnreadableRow(_) => &self.rejected_unreadable_row,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for one record's resolution outcomes
    pub fn record_resolution(&self, descriptors: &[ImageDescriptor]) {
        for descriptor in descriptors {
            let counter = match descriptor.status {
                ResolutionStatus::Resolved { .. } => &self.images_resolved,
                ResolutionStatus::Failed(_) => &self.images_failed,
                ResolutionStatus::Skipped => &self.images_skipped,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_no_usable_images(&self) {
        self.records_without_usable_images
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn manifest_written(&self) {
        self.manifests_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn manifest_skipped(&self) {
        self.manifests_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Immutable snapshot of the counters
    pub fn snapshot(&self) -> RunReport {
        RunReport {
            records_read: self.records_read.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            rejected_missing_catalog_number: self
                .rejected_missing_catalog_number
                .load(Ordering::Relaxed),
            rejected_missing_required_field: self
                .rejected_missing_required_field
                .load(Ordering::Relaxed),
            rejected_no_media_uri: self.rejected_no_media_uri.load(Ordering::Relaxed),
            rejected_unreadable_row: self.rejected_unreadable_row.load(Ordering::Relaxed),
            images_resolved: self.images_resolved.load(Ordering::Relaxed),
            images_failed: self.images_failed.load(Ordering::Relaxed),
            images_skipped: self.images_skipped.load(Ordering::Relaxed),
            records_without_usable_images: self
                .records_without_usable_images
                .load(Ordering::Relaxed),
            manifests_written: self.manifests_written.load(Ordering::Relaxed),
            manifests_skipped: self.manifests_skipped.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Final counts for one run, immutable once taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub records_read: u64,
    pub records_rejected: u64,
    pub rejected_missing_catalog_number: u64,
    pub rejected_missing_required_field: u64,
    pub rejected_no_media_uri: u64,
    pub rejected_unreadable_row: u64,
    pub images_resolved: u64,
    pub images_failed: u64,
    pub images_skipped: u64,
    pub records_without_usable_images: u64,
    pub manifests_written: u64,
    pub manifests_skipped: u64,
    pub write_errors: u64,
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Records read:       {}", self.records_read)?;
        writeln!(f, "Records rejected:   {}", self.records_rejected)?;
        writeln!(f, "Images resolved:    {}", self.images_resolved)?;
        writeln!(f, "Images failed:      {}", self.images_failed)?;
        writeln!(f, "Images skipped:     {}", self.images_skipped)?;
        writeln!(f, "Manifests written:  {}", self.manifests_written)?;
        writeln!(f, "Manifests skipped:  {}", self.manifests_skipped)?;
        write!(f, "Write errors:       {}", self.write_errors)
    }
}
