//! Visible file set per (partition, bucket).
//!
//! The storage engine owns the data behind each file; the mirror only
//! records which files the engine was told to read, so refresh can be
//! observed and checked without reaching into the engine.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::lookup::router::{BucketId, PartitionValue};
use crate::lookup::source::DataFileMeta;

/// What one applied diff changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOutcome {
    /// Files that were visible and got retired.
    pub removed: usize,
    /// Files that became visible (re-adding a visible file counts once).
    pub added: usize,
    /// Retired file names the mirror had never seen.
    pub unknown_retired: Vec<String>,
}

/// Running union of applied file-set diffs, keyed by (partition, bucket).
#[derive(Debug, Default)]
pub struct FileSetMirror {
    buckets: FxHashMap<(PartitionValue, BucketId), BTreeMap<String, DataFileMeta>>,
    diffs_applied: u64,
}

impl FileSetMirror {
    /// An empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one diff: drop `before`, then install `after`.
    ///
    /// A file listed in both stays visible with the metadata from `after`.
    pub fn apply(
        &mut self,
        partition: &PartitionValue,
        bucket: BucketId,
        before: &[DataFileMeta],
        after: &[DataFileMeta],
    ) -> DiffOutcome {
        let mut outcome = DiffOutcome::default();
        let files = self
            .buckets
            .entry((partition.clone(), bucket))
            .or_default();

        for file in before {
            if files.remove(&file.file_name).is_some() {
                outcome.removed += 1;
            } else {
                outcome.unknown_retired.push(file.file_name.clone());
            }
        }
        for file in after {
            if files.insert(file.file_name.clone(), file.clone()).is_none() {
                outcome.added += 1;
            }
        }

        if files.is_empty() {
            self.buckets.remove(&(partition.clone(), bucket));
        }
        self.diffs_applied += 1;
        outcome
    }

    /// Visible files of one bucket, ordered by name.
    #[must_use]
    pub fn files(&self, partition: &PartitionValue, bucket: BucketId) -> Vec<&DataFileMeta> {
        self.buckets
            .get(&(partition.clone(), bucket))
            .map(|files| files.values().collect())
            .unwrap_or_default()
    }

    /// Visible file names of one bucket, ordered.
    #[must_use]
    pub fn file_names(&self, partition: &PartitionValue, bucket: BucketId) -> Vec<String> {
        self.files(partition, bucket)
            .into_iter()
            .map(|f| f.file_name.clone())
            .collect()
    }

    /// Number of buckets with at least one visible file.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Total visible files across all buckets.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }

    /// Diffs applied since creation.
    #[must_use]
    pub fn diffs_applied(&self) -> u64 {
        self.diffs_applied
    }

    /// Whether nothing is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Forget every bucket.
    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
