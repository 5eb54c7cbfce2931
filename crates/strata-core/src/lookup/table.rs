//! Lookup table trait and the primary-key partial lookup table.
//!
//! A [`LookupTable`] resolves join-key rows to dimension rows for a
//! streaming lookup join. [`PrimaryKeyLookupTable`] does so for an
//! unpartitioned, fixed-bucket primary-key table without loading the
//! whole table: each probe is routed to its bucket and answered by a
//! [`QueryExecutor`].
//!
//! ## Lookup Flow
//!
//! 1. The join operator builds the table and calls
//!    [`open`](LookupTable::open), which performs the first refresh
//! 2. Each probe row goes through [`get`](LookupTable::get): route to
//!    `(partition, bucket, primary key)`, then ask the executor
//! 3. Between batches the operator calls [`refresh`](LookupTable::refresh)
//!    so later lookups observe new upstream data
//! 4. [`close`](LookupTable::close) releases the executor's resources

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::lookup::config::{LookupTableConfig, QueryMode};
use crate::lookup::executor::{LocalQueryExecutor, QueryExecutor, RemoteQueryExecutor};
use crate::lookup::metrics::LookupMetrics;
use crate::lookup::router::KeyRouter;
use crate::lookup::row::Row;
use crate::lookup::schema::TableDescriptor;
use crate::lookup::source::{
    FileChangeSource, LocalTableQuery, LookupError, RemoteTableQuery, Result, TableStore,
};

/// Lifecycle interface a lookup join drives.
///
/// One caller drives a table; `get` and `refresh` are never invoked
/// concurrently. Use [`SharedLookupTable`] when several threads need
/// access.
pub trait LookupTable: Send {
    /// Establish the initial view. Must precede any [`get`](Self::get).
    ///
    /// # Errors
    ///
    /// [`LookupError::InvalidState`] unless freshly created, or the
    /// error of the initial refresh.
    fn open(&mut self) -> Result<()>;

    /// Rows matching a join-key row: empty on a miss, otherwise one row.
    ///
    /// # Errors
    ///
    /// [`LookupError::KeyArity`] for a malformed probe row,
    /// [`LookupError::InvalidState`] unless open, or the executor's
    /// failure.
    fn get(&mut self, key: &Row) -> Result<Vec<Row>>;

    /// Catch up with upstream changes.
    ///
    /// # Errors
    ///
    /// [`LookupError::InvalidState`] unless open, or the executor's
    /// failure.
    fn refresh(&mut self) -> Result<()>;

    /// Release all resources. Safe to call in any state; the table is
    /// unusable afterwards even if this fails.
    ///
    /// # Errors
    ///
    /// The first failure while releasing resources.
    fn close(&mut self) -> Result<()>;
}

/// Lifecycle state of a [`PrimaryKeyLookupTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    /// Constructed, not yet opened.
    Created,
    /// Opened and serving lookups.
    Open,
    /// Closed; every operation but `close` fails.
    Closed,
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Partial lookup table over an unpartitioned fixed-bucket primary-key
/// table.
///
/// Construction validates the descriptor, the join key and the value
/// projection before any executor resource is created, so a rejected
/// table leaves nothing behind.
pub struct PrimaryKeyLookupTable<E> {
    table: String,
    router: KeyRouter,
    executor: E,
    state: TableState,
    metrics: Arc<LookupMetrics>,
}

/// Validated routing and projection for a table.
fn prepare(
    descriptor: &TableDescriptor,
    config: &LookupTableConfig,
) -> Result<(KeyRouter, Vec<usize>)> {
    let join_key = config.join_key_for(descriptor);
    let router = KeyRouter::new(descriptor, &join_key)?;
    let projection = config.resolved_projection(descriptor)?;
    Ok((router, projection))
}

impl<Q, S> PrimaryKeyLookupTable<LocalQueryExecutor<Q, S>>
where
    Q: LocalTableQuery,
    S: FileChangeSource,
{
    /// Build a table answered by a local engine kept fresh by `scan`.
    ///
    /// # Errors
    ///
    /// Configuration errors (nothing is called on `query` or `scan`), or
    /// a failure setting up the working directory.
    pub fn create_local_table(
        descriptor: &TableDescriptor,
        query: Q,
        scan: S,
        config: &LookupTableConfig,
    ) -> Result<Self> {
        let (router, projection) = prepare(descriptor, config)?;
        let executor = LocalQueryExecutor::new(query, scan, &projection, &config.temp_dir)?;
        Ok(Self::assemble(descriptor, router, executor))
    }
}

impl<R: RemoteTableQuery> PrimaryKeyLookupTable<RemoteQueryExecutor<R>> {
    /// Build a table answered by a remote query service.
    ///
    /// # Errors
    ///
    /// Configuration errors; nothing is called on `query`.
    pub fn create_remote_table(
        descriptor: &TableDescriptor,
        query: R,
        config: &LookupTableConfig,
    ) -> Result<Self> {
        let (router, projection) = prepare(descriptor, config)?;
        let executor = RemoteQueryExecutor::new(query, &projection);
        Ok(Self::assemble(descriptor, router, executor))
    }
}

impl PrimaryKeyLookupTable<Box<dyn QueryExecutor>> {
    /// Build a table for `store` with the strategy chosen by
    /// [`LookupTableConfig::query_mode`].
    ///
    /// # Errors
    ///
    /// Configuration errors (the store is not asked for any collaborator),
    /// or the store's failure creating one.
    pub fn create(store: &dyn TableStore, config: &LookupTableConfig) -> Result<Self> {
        let descriptor = store.descriptor();
        let (router, projection) = prepare(descriptor, config)?;

        let executor: Box<dyn QueryExecutor> = match config.query_mode {
            QueryMode::Local => {
                let mut query = store.new_local_query()?;
                let scan = match store.new_file_monitor_scan() {
                    Ok(scan) => scan,
                    Err(e) => {
                        if let Err(close_err) = query.close() {
                            warn!(error = %close_err, "failed to close local table query");
                        }
                        return Err(e);
                    }
                };
                Box::new(LocalQueryExecutor::new(
                    query,
                    scan,
                    &projection,
                    &config.temp_dir,
                )?)
            }
            QueryMode::Remote => Box::new(RemoteQueryExecutor::new(
                store.new_remote_query()?,
                &projection,
            )),
        };
        Ok(Self::assemble(descriptor, router, executor))
    }
}

impl<E: QueryExecutor> PrimaryKeyLookupTable<E> {
    fn assemble(descriptor: &TableDescriptor, router: KeyRouter, executor: E) -> Self {
        info!(
            table = %descriptor.name,
            query_mode = executor.name(),
            num_buckets = router.extractor().num_buckets(),
            rearranged = router.rearranges(),
            "created primary-key lookup table"
        );
        Self {
            table: descriptor.name.clone(),
            router,
            executor,
            state: TableState::Created,
            metrics: Arc::new(LookupMetrics::default()),
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.table
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TableState {
        self.state
    }

    /// The key router.
    #[must_use]
    pub fn router(&self) -> &KeyRouter {
        &self.router
    }

    /// The query executor.
    #[must_use]
    pub fn query_executor(&self) -> &E {
        &self.executor
    }

    /// Shared handle to the table's counters.
    #[must_use]
    pub fn metrics(&self) -> Arc<LookupMetrics> {
        Arc::clone(&self.metrics)
    }

    fn require(&self, expected: TableState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(LookupError::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            })
        }
    }

    fn refresh_executor(&mut self) -> Result<()> {
        let stats = self.executor.refresh()?;
        self.metrics.record_refresh(stats.splits);
        if stats.splits > 0 {
            debug!(
                table = %self.table,
                batches = stats.batches,
                splits = stats.splits,
                "lookup table refreshed"
            );
        }
        Ok(())
    }
}

impl<E: QueryExecutor> LookupTable for PrimaryKeyLookupTable<E> {
    fn open(&mut self) -> Result<()> {
        self.require(TableState::Created)?;
        self.refresh_executor()?;
        self.state = TableState::Open;
        info!(
            table = %self.table,
            query_mode = self.executor.name(),
            "lookup table opened"
        );
        Ok(())
    }

    fn get(&mut self, key: &Row) -> Result<Vec<Row>> {
        self.require(TableState::Open)?;
        let routed = self.router.route(key)?;
        match self
            .executor
            .lookup(&routed.partition, routed.bucket, &routed.key)
        {
            Ok(found) => {
                self.metrics.record_lookup(found.is_some());
                Ok(found.into_iter().collect())
            }
            Err(e) => {
                self.metrics.record_error();
                Err(e)
            }
        }
    }

    fn refresh(&mut self) -> Result<()> {
        self.require(TableState::Open)?;
        self.refresh_executor()
    }

    fn close(&mut self) -> Result<()> {
        if self.state == TableState::Closed {
            return Ok(());
        }
        self.state = TableState::Closed;

        let result = self.executor.close();
        match &result {
            Ok(()) => info!(table = %self.table, "lookup table closed"),
            Err(e) => warn!(table = %self.table, error = %e, "lookup table closed with error"),
        }
        result
    }
}

impl<E: QueryExecutor> fmt::Debug for PrimaryKeyLookupTable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimaryKeyLookupTable")
            .field("table", &self.table)
            .field("query_mode", &self.executor.name())
            .field("state", &self.state)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

/// A lookup table shared between threads.
///
/// Every call takes one lock, so a refresh never interleaves with a
/// lookup.
pub struct SharedLookupTable<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for SharedLookupTable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: LookupTable> SharedLookupTable<T> {
    /// Wrap `table`.
    pub fn new(table: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(table)),
        }
    }

    /// See [`LookupTable::open`].
    ///
    /// # Errors
    ///
    /// As [`LookupTable::open`].
    pub fn open(&self) -> Result<()> {
        self.inner.lock().open()
    }

    /// See [`LookupTable::get`].
    ///
    /// # Errors
    ///
    /// As [`LookupTable::get`].
    pub fn get(&self, key: &Row) -> Result<Vec<Row>> {
        self.inner.lock().get(key)
    }

    /// See [`LookupTable::refresh`].
    ///
    /// # Errors
    ///
    /// As [`LookupTable::refresh`].
    pub fn refresh(&self) -> Result<()> {
        self.inner.lock().refresh()
    }

    /// See [`LookupTable::close`].
    ///
    /// # Errors
    ///
    /// As [`LookupTable::close`].
    pub fn close(&self) -> Result<()> {
        self.inner.lock().close()
    }

    /// Lock the table for several calls in a row.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }
}
