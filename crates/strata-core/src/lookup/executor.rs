//! Query executors: where a routed key is actually looked up.
//!
//! - [`LocalQueryExecutor`] keeps a local LSM-direct engine in step with
//!   the table's file manifest and queries it in-process.
//! - [`RemoteQueryExecutor`] forwards every lookup to a query service.
//!
//! Both take `&mut self`: an executor is driven by one caller that
//! alternates lookups and refreshes, never concurrently.

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use tracing::{debug, trace, warn};

use crate::lookup::mirror::FileSetMirror;
use crate::lookup::router::{BucketId, PartitionValue};
use crate::lookup::row::Row;
use crate::lookup::source::{
    FileChangeSource, LocalTableQuery, LookupError, RemoteTableQuery, Result, Split,
};

/// Prefix of the per-executor working directory.
const WORK_DIR_PREFIX: &str = "strata-lookup-";

/// Work done by one [`QueryExecutor::refresh`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Non-empty batches planned.
    pub batches: u64,
    /// File-set diffs applied.
    pub splits: u64,
}

/// Strategy answering point lookups for a lookup table.
pub trait QueryExecutor: Send {
    /// Row matching `key` within exactly `(partition, bucket)`.
    ///
    /// # Errors
    ///
    /// Engine or transport failures, passed through unchanged.
    fn lookup(
        &mut self,
        partition: &PartitionValue,
        bucket: BucketId,
        key: &Row,
    ) -> Result<Option<Row>>;

    /// Catch up with everything currently available upstream.
    ///
    /// Returns once no further change is immediately pending.
    ///
    /// # Errors
    ///
    /// [`LookupError::UnsupportedSplit`] for a split that is not a
    /// single-bucket file diff, or any collaborator failure.
    fn refresh(&mut self) -> Result<RefreshStats>;

    /// Release every owned resource.
    ///
    /// # Errors
    ///
    /// The first release failure. Everything is released regardless.
    fn close(&mut self) -> Result<()>;

    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Files visible for `(partition, bucket)`, if this strategy mirrors
    /// file sets locally.
    fn visible_files(&self, _partition: &PartitionValue, _bucket: BucketId) -> Option<Vec<String>> {
        None
    }
}

impl<T: QueryExecutor + ?Sized> QueryExecutor for Box<T> {
    fn lookup(
        &mut self,
        partition: &PartitionValue,
        bucket: BucketId,
        key: &Row,
    ) -> Result<Option<Row>> {
        (**self).lookup(partition, bucket, key)
    }

    fn refresh(&mut self) -> Result<RefreshStats> {
        (**self).refresh()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn visible_files(&self, partition: &PartitionValue, bucket: BucketId) -> Option<Vec<String>> {
        (**self).visible_files(partition, bucket)
    }
}

/// Executor over a locally refreshed LSM-direct engine.
///
/// Owns the engine, the file-monitor scan, the [`FileSetMirror`] and a
/// private working directory under the configured temp dir. The
/// directory lives until [`close`](QueryExecutor::close), or until the
/// executor is dropped.
pub struct LocalQueryExecutor<Q, S> {
    query: Q,
    scan: S,
    mirror: FileSetMirror,
    work_dir: Option<TempDir>,
}

impl<Q: LocalTableQuery, S: FileChangeSource> LocalQueryExecutor<Q, S> {
    /// Create the working directory and configure the engine.
    ///
    /// Missing parents of `temp_dir` are created and left in place; only
    /// the private `strata-lookup-*` directory is removed on close.
    /// The mirror starts empty; nothing is read until the first
    /// [`refresh`](QueryExecutor::refresh).
    ///
    /// # Errors
    ///
    /// [`LookupError::Io`] if the working directory cannot be created, or
    /// the engine's error from [`LocalTableQuery::with_io_dir`]. The
    /// engine is closed before the error is returned.
    pub fn new(mut query: Q, scan: S, projection: &[usize], temp_dir: &Path) -> Result<Self> {
        let work_dir = match create_work_dir(temp_dir) {
            Ok(dir) => dir,
            Err(e) => {
                close_quietly(&mut query);
                return Err(e);
            }
        };

        query.with_value_projection(projection);
        if let Err(e) = query.with_io_dir(work_dir.path()) {
            close_quietly(&mut query);
            return Err(e);
        }

        debug!(
            work_dir = %work_dir.path().display(),
            projection = ?projection,
            "local query executor created"
        );

        Ok(Self {
            query,
            scan,
            mirror: FileSetMirror::new(),
            work_dir: Some(work_dir),
        })
    }

    /// The mirrored file sets.
    #[must_use]
    pub fn mirror(&self) -> &FileSetMirror {
        &self.mirror
    }

    /// The working directory, until closed.
    #[must_use]
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_ref().map(TempDir::path)
    }

    /// The underlying engine.
    #[must_use]
    pub fn table_query(&self) -> &Q {
        &self.query
    }

    fn apply_split(&mut self, split: Split) -> Result<()> {
        let split = match split {
            Split::Data(split) => split,
            Split::Other { kind } => {
                return Err(LookupError::UnsupportedSplit(format!(
                    "expected a single-bucket data split, got '{kind}'"
                )));
            }
        };

        self.query.refresh_files(
            &split.partition,
            split.bucket,
            &split.before_files,
            &split.data_files,
        )?;
        let outcome = self.mirror.apply(
            &split.partition,
            split.bucket,
            &split.before_files,
            &split.data_files,
        );

        if !outcome.unknown_retired.is_empty() {
            warn!(
                partition = %split.partition,
                bucket = split.bucket,
                files = ?outcome.unknown_retired,
                "diff retired files that were never visible"
            );
        }
        trace!(
            snapshot_id = split.snapshot_id,
            partition = %split.partition,
            bucket = split.bucket,
            before = split.before_files.len(),
            after = split.data_files.len(),
            "applied file-set diff"
        );
        Ok(())
    }
}

impl<Q: LocalTableQuery, S: FileChangeSource> QueryExecutor for LocalQueryExecutor<Q, S> {
    fn lookup(
        &mut self,
        partition: &PartitionValue,
        bucket: BucketId,
        key: &Row,
    ) -> Result<Option<Row>> {
        self.query.lookup(partition, bucket, key)
    }

    fn refresh(&mut self) -> Result<RefreshStats> {
        let mut stats = RefreshStats::default();
        // Terminates once the source reports no pending splits.
        loop {
            let splits = self.scan.plan()?;
            if splits.is_empty() {
                break;
            }

            let in_batch = splits.len();
            for split in splits {
                self.apply_split(split)?;
                stats.splits += 1;
            }
            stats.batches += 1;

            debug!(
                splits = in_batch,
                total_splits = stats.splits,
                visible_files = self.mirror.file_count(),
                "applied refresh batch"
            );
        }
        Ok(stats)
    }

    fn close(&mut self) -> Result<()> {
        self.mirror.clear();
        let query_result = self.query.close();
        let dir_result = match self.work_dir.take() {
            Some(dir) => dir.close().map_err(LookupError::from),
            None => Ok(()),
        };

        if let Err(e) = &query_result {
            warn!(error = %e, "failed to close local table query");
        }
        if let Err(e) = &dir_result {
            warn!(error = %e, "failed to remove lookup working directory");
        }
        query_result.and(dir_result)
    }

    fn name(&self) -> &'static str {
        "local"
    }

    fn visible_files(&self, partition: &PartitionValue, bucket: BucketId) -> Option<Vec<String>> {
        Some(self.mirror.file_names(partition, bucket))
    }
}

impl<Q, S> std::fmt::Debug for LocalQueryExecutor<Q, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalQueryExecutor")
            .field("mirror", &self.mirror)
            .field("work_dir", &self.work_dir.as_ref().map(TempDir::path))
            .finish_non_exhaustive()
    }
}

fn create_work_dir(temp_dir: &Path) -> Result<TempDir> {
    fs::create_dir_all(temp_dir)?;
    tempfile::Builder::new()
        .prefix(WORK_DIR_PREFIX)
        .tempdir_in(temp_dir)
        .map_err(LookupError::from)
}

fn close_quietly<Q: LocalTableQuery>(query: &mut Q) {
    if let Err(e) = query.close() {
        warn!(error = %e, "failed to close local table query after setup error");
    }
}

/// Executor that forwards every lookup to a remote query service.
///
/// The service owns freshness, so [`refresh`](QueryExecutor::refresh)
/// does nothing.
pub struct RemoteQueryExecutor<R> {
    query: R,
}

impl<R: RemoteTableQuery> RemoteQueryExecutor<R> {
    /// Wrap a client and push the value projection to it.
    pub fn new(mut query: R, projection: &[usize]) -> Self {
        query.with_value_projection(projection);
        Self { query }
    }

    /// The underlying client.
    #[must_use]
    pub fn table_query(&self) -> &R {
        &self.query
    }
}

impl<R: RemoteTableQuery> QueryExecutor for RemoteQueryExecutor<R> {
    fn lookup(
        &mut self,
        partition: &PartitionValue,
        bucket: BucketId,
        key: &Row,
    ) -> Result<Option<Row>> {
        self.query.lookup(partition, bucket, key)
    }

    fn refresh(&mut self) -> Result<RefreshStats> {
        Ok(RefreshStats::default())
    }

    fn close(&mut self) -> Result<()> {
        self.query.close()
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

impl<R> std::fmt::Debug for RemoteQueryExecutor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteQueryExecutor").finish_non_exhaustive()
    }
}
