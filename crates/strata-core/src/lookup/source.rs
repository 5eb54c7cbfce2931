//! Storage-engine contracts consumed by lookup tables.
//!
//! The lookup core never reads data files itself. It drives three
//! collaborators supplied by the storage engine:
//!
//! - [`LocalTableQuery`]: an LSM-direct point-lookup engine over a set of
//!   data files per bucket, refreshed with file-set diffs
//! - [`FileChangeSource`]: a file-monitor scan that plans the pending
//!   per-bucket file diffs
//! - [`RemoteTableQuery`]: a client for a remote query service that owns
//!   freshness on its side
//!
//! [`TableStore`] bundles them behind one table handle so a lookup table
//! can be built from configuration alone.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error_codes;
use crate::lookup::router::{BucketId, PartitionValue};
use crate::lookup::row::Row;
use crate::lookup::schema::{BucketMode, TableDescriptor};

/// Result type for lookup operations.
pub type Result<T, E = LookupError> = std::result::Result<T, E>;

/// Errors from lookup table construction, refresh and query.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The table has partition keys.
    #[error(
        "[{code}] partitioned table '{table}' is not supported in partial lookup mode \
         (partition keys: {partition_keys:?})",
        code = error_codes::PARTITIONED_TABLE
    )]
    PartitionedTable {
        /// Table name.
        table: String,
        /// The table's partition keys.
        partition_keys: Vec<String>,
    },

    /// The table does not use fixed-count bucketing.
    #[error(
        "[{code}] unsupported bucket mode for partial lookup on '{table}': {mode}",
        code = error_codes::UNSUPPORTED_BUCKET_MODE
    )]
    UnsupportedBucketMode {
        /// Table name.
        table: String,
        /// The rejected mode.
        mode: BucketMode,
    },

    /// Any other construction-time validation failure.
    #[error("[{code}] invalid configuration: {0}", code = error_codes::INVALID_CONFIG)]
    InvalidConfig(String),

    /// A probe row does not have the join key's column count.
    #[error(
        "[{code}] key row has {actual} columns, expected {expected}",
        code = error_codes::KEY_ARITY
    )]
    KeyArity {
        /// Columns the join key defines.
        expected: usize,
        /// Columns the row carried.
        actual: usize,
    },

    /// The change source produced a split that is not a single-bucket
    /// file diff.
    #[error("[{code}] unsupported split: {0}", code = error_codes::UNSUPPORTED_SPLIT)]
    UnsupportedSplit(String),

    /// The local storage engine failed.
    #[error("[{code}] storage error: {0}", code = error_codes::STORAGE_ERROR)]
    Storage(String),

    /// The remote query service could not be reached or failed.
    #[error("[{code}] connection failed: {0}", code = error_codes::CONNECTION_FAILED)]
    Connection(String),

    /// Filesystem error (working directory).
    #[error("[{code}] I/O error: {0}", code = error_codes::IO_ERROR)]
    Io(#[from] std::io::Error),

    /// Operation invoked in the wrong lifecycle state.
    #[error(
        "[{code}] invalid state: expected {expected}, was {actual}",
        code = error_codes::INVALID_STATE
    )]
    InvalidState {
        /// State the operation requires.
        expected: String,
        /// State the table was in.
        actual: String,
    },
}

impl LookupError {
    /// Stable `STR-NNNN` code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PartitionedTable { .. } => error_codes::PARTITIONED_TABLE,
            Self::UnsupportedBucketMode { .. } => error_codes::UNSUPPORTED_BUCKET_MODE,
            Self::InvalidConfig(_) => error_codes::INVALID_CONFIG,
            Self::KeyArity { .. } => error_codes::KEY_ARITY,
            Self::UnsupportedSplit(_) => error_codes::UNSUPPORTED_SPLIT,
            Self::Storage(_) => error_codes::STORAGE_ERROR,
            Self::Connection(_) => error_codes::CONNECTION_FAILED,
            Self::Io(_) => error_codes::IO_ERROR,
            Self::InvalidState { .. } => error_codes::INVALID_STATE,
        }
    }

    /// Returns true for errors raised while constructing a table.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::PartitionedTable { .. }
                | Self::UnsupportedBucketMode { .. }
                | Self::InvalidConfig(_)
        )
    }

    /// Returns true if the upstream change source broke its contract.
    ///
    /// Such errors are fatal: retrying the refresh re-plans the same
    /// misconfigured scan.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::UnsupportedSplit(_))
    }
}

/// Metadata of one data file in a bucket.
///
/// The lookup core only tracks files by name; the remaining fields are
/// carried through to the storage engine untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataFileMeta {
    /// File name, unique within the table.
    pub file_name: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Number of rows in the file.
    pub row_count: u64,
    /// LSM level the file lives on.
    pub level: u32,
    /// Smallest sequence number in the file.
    pub min_sequence_number: u64,
    /// Largest sequence number in the file.
    pub max_sequence_number: u64,
}

impl DataFileMeta {
    /// File metadata with only a name; sizes and sequence range are zero.
    #[must_use]
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            file_size: 0,
            row_count: 0,
            level: 0,
            min_sequence_number: 0,
            max_sequence_number: 0,
        }
    }

    /// Set the LSM level.
    #[must_use]
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    /// Set the row count and file size.
    #[must_use]
    pub fn with_stats(mut self, row_count: u64, file_size: u64) -> Self {
        self.row_count = row_count;
        self.file_size = file_size;
        self
    }

    /// Set the sequence number range.
    #[must_use]
    pub fn with_sequence_range(mut self, min: u64, max: u64) -> Self {
        self.min_sequence_number = min;
        self.max_sequence_number = max;
        self
    }
}

/// An incremental change to one bucket's file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSplit {
    /// Snapshot that produced the change.
    pub snapshot_id: u64,
    /// Partition the bucket belongs to.
    pub partition: PartitionValue,
    /// Bucket within the partition.
    pub bucket: BucketId,
    /// Files retired by this change.
    pub before_files: Vec<DataFileMeta>,
    /// Files added by this change.
    pub data_files: Vec<DataFileMeta>,
}

/// A unit of work planned by a [`FileChangeSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Split {
    /// A single-bucket file diff.
    Data(DataSplit),
    /// Any other split kind (e.g. a changelog or batch-read split).
    Other {
        /// Human-readable split kind, used in error messages.
        kind: String,
    },
}

impl Split {
    /// Short name of the split kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Data(_) => "data",
            Self::Other { kind } => kind,
        }
    }
}

/// Continuous file-monitor scan over a table.
pub trait FileChangeSource: Send {
    /// Plan the next batch of pending splits.
    ///
    /// An empty batch means "caught up for now". The source resumes from
    /// its own position on the next call; splits it returned are never
    /// returned again.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Storage`] if the manifest cannot be read.
    fn plan(&mut self) -> Result<Vec<Split>>;
}

/// LSM-direct point-lookup engine over locally known bucket files.
pub trait LocalTableQuery: Send {
    /// Restrict returned value rows to the given field indices.
    fn with_value_projection(&mut self, projection: &[usize]);

    /// Directory the engine may use for spill and merge files.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Io`] or [`LookupError::Storage`] if the
    /// engine cannot use the directory.
    fn with_io_dir(&mut self, dir: &Path) -> Result<()>;

    /// Install a file-set diff for one bucket: `before` files stop being
    /// read, `after` files start being read.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Storage`] on engine failure.
    fn refresh_files(
        &mut self,
        partition: &PartitionValue,
        bucket: BucketId,
        before: &[DataFileMeta],
        after: &[DataFileMeta],
    ) -> Result<()>;

    /// Point lookup of `key` within exactly `(partition, bucket)`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Storage`] on engine failure.
    fn lookup(
        &mut self,
        partition: &PartitionValue,
        bucket: BucketId,
        key: &Row,
    ) -> Result<Option<Row>>;

    /// Release readers and cached files.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Storage`] or [`LookupError::Io`] if a
    /// resource could not be released.
    fn close(&mut self) -> Result<()>;
}

/// Client of a remote query service.
pub trait RemoteTableQuery: Send {
    /// Restrict returned value rows to the given field indices.
    fn with_value_projection(&mut self, projection: &[usize]);

    /// Point lookup of `key` within exactly `(partition, bucket)`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Connection`] on transport failure.
    fn lookup(
        &mut self,
        partition: &PartitionValue,
        bucket: BucketId,
        key: &Row,
    ) -> Result<Option<Row>>;

    /// Close the session.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Connection`] if the session could not be
    /// closed cleanly.
    fn close(&mut self) -> Result<()>;
}

/// Table handle that creates the collaborators for a lookup table.
///
/// Creating a collaborator may open connections or files, so lookup
/// tables only call these after the descriptor has been validated.
pub trait TableStore {
    /// The table's schema and bucketing.
    fn descriptor(&self) -> &TableDescriptor;

    /// Create a local LSM-direct query engine.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Storage`] if the engine cannot be created.
    fn new_local_query(&self) -> Result<Box<dyn LocalTableQuery>>;

    /// Create a file-monitor scan positioned at the table's latest state.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Storage`] if the scan cannot be created.
    fn new_file_monitor_scan(&self) -> Result<Box<dyn FileChangeSource>>;

    /// Create a remote query client.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Connection`] if no query service is
    /// reachable.
    fn new_remote_query(&self) -> Result<Box<dyn RemoteTableQuery>>;
}

impl<T: FileChangeSource + ?Sized> FileChangeSource for Box<T> {
    fn plan(&mut self) -> Result<Vec<Split>> {
        (**self).plan()
    }
}

impl<T: LocalTableQuery + ?Sized> LocalTableQuery for Box<T> {
    fn with_value_projection(&mut self, projection: &[usize]) {
        (**self).with_value_projection(projection);
    }

    fn with_io_dir(&mut self, dir: &Path) -> Result<()> {
        (**self).with_io_dir(dir)
    }

    fn refresh_files(
        &mut self,
        partition: &PartitionValue,
        bucket: BucketId,
        before: &[DataFileMeta],
        after: &[DataFileMeta],
    ) -> Result<()> {
        (**self).refresh_files(partition, bucket, before, after)
    }

    fn lookup(
        &mut self,
        partition: &PartitionValue,
        bucket: BucketId,
        key: &Row,
    ) -> Result<Option<Row>> {
        (**self).lookup(partition, bucket, key)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<T: RemoteTableQuery + ?Sized> RemoteTableQuery for Box<T> {
    fn with_value_projection(&mut self, projection: &[usize]) {
        (**self).with_value_projection(projection);
    }

    fn lookup(
        &mut self,
        partition: &PartitionValue,
        bucket: BucketId,
        key: &Row,
    ) -> Result<Option<Row>> {
        (**self).lookup(partition, bucket, key)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
