//! # Lookup Table Module
//!
//! Primary-key partial lookup tables for streaming lookup joins.
//!
//! A lookup join enriches stream events with rows of a large, changing
//! primary-key table. Rather than loading the table, a
//! [`PrimaryKeyLookupTable`] routes each probe to the bucket that owns
//! the key and answers it from that bucket alone.
//!
//! ## Module Overview
//!
//! - [`row`]: `Datum` and `Row` value types
//! - [`encoding`]: order-preserving key encoding used for bucket hashing
//! - [`schema`]: table descriptors and bucket modes
//! - [`router`]: join key → (partition, bucket, primary key)
//! - [`source`]: storage-engine contracts and the crate error type
//! - [`mirror`]: visible file set per bucket
//! - [`executor`]: local and remote query strategies
//! - [`table`]: `LookupTable` lifecycle and the primary-key table
//! - [`config`]: table configuration and query mode
//! - [`metrics`]: lookup counters

pub mod config;
pub mod encoding;
pub mod executor;
pub mod metrics;
pub mod mirror;
pub mod router;
pub mod row;
pub mod schema;
pub mod source;
pub mod table;

// Re-export commonly used types
pub use config::{LookupTableConfig, QueryMode, QUERY_MODE_OPTION, TMP_DIR_OPTION};
pub use executor::{LocalQueryExecutor, QueryExecutor, RefreshStats, RemoteQueryExecutor};
pub use metrics::{LookupMetrics, LookupMetricsSnapshot};
pub use mirror::{DiffOutcome, FileSetMirror};
pub use router::{
    BucketId, FixedBucketExtractor, KeyRearrange, KeyRouter, PartitionValue, RoutedKey,
};
pub use row::{Datum, Row};
pub use schema::{BucketMode, TableDescriptor};
pub use source::{
    DataFileMeta, DataSplit, FileChangeSource, LocalTableQuery, LookupError, RemoteTableQuery,
    Result, Split, TableStore,
};
pub use table::{LookupTable, PrimaryKeyLookupTable, SharedLookupTable, TableState};
