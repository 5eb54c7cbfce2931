//! In-memory bucketed LSM table shared by the integration tests.
//!
//! [`MemoryTable`] plays every storage-engine role: a writer that commits
//! rows into per-bucket files, the file-monitor scan that plans those
//! commits as file diffs, a local LSM-direct engine, and a remote query
//! service. Every collaborator call is counted.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use strata_core::lookup::{
    BucketId, DataFileMeta, DataSplit, FileChangeSource, FixedBucketExtractor, LocalTableQuery,
    LookupError, PartitionValue, RemoteTableQuery, Result, Row, Split, TableDescriptor,
    TableStore,
};

/// Owned column names.
pub fn names(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| (*s).to_string()).collect()
}

/// Collaborator calls observed by a [`MemoryTable`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub local_created: usize,
    pub scans_created: usize,
    pub remote_created: usize,
    pub io_dirs: usize,
    pub plans: usize,
    pub refresh_files: usize,
    pub local_lookups: usize,
    pub remote_lookups: usize,
    pub local_closes: usize,
    pub remote_closes: usize,
}

impl CallCounts {
    /// Whether no collaborator was ever created or called.
    pub fn untouched(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Default)]
struct Shared {
    /// Full rows of every written file.
    files: HashMap<String, Vec<Row>>,
    /// Writer-side live files per bucket, oldest first.
    live: HashMap<(PartitionValue, BucketId), Vec<DataFileMeta>>,
    pending: VecDeque<Vec<Split>>,
    next_file: u64,
    snapshot_id: u64,
    calls: CallCounts,
    io_dirs: Vec<PathBuf>,
    fail_lookups: bool,
}

/// An in-memory primary-key table with fixed buckets.
#[derive(Clone)]
pub struct MemoryTable {
    descriptor: TableDescriptor,
    pk_indices: Vec<usize>,
    shared: Arc<Mutex<Shared>>,
}

impl MemoryTable {
    pub fn new(descriptor: TableDescriptor) -> Self {
        let pk_indices = descriptor
            .primary_keys
            .iter()
            .filter_map(|pk| descriptor.field_index(pk))
            .collect();
        Self {
            descriptor,
            pk_indices,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    pub fn calls(&self) -> CallCounts {
        self.shared.lock().calls
    }

    pub fn io_dirs(&self) -> Vec<PathBuf> {
        self.shared.lock().io_dirs.clone()
    }

    pub fn pending_batches(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Make every engine and remote lookup fail.
    pub fn set_fail_lookups(&self, fail: bool) {
        self.shared.lock().fail_lookups = fail;
    }

    /// Primary-key columns of a full row.
    pub fn primary_key(&self, row: &Row) -> Row {
        row.project(&self.pk_indices).unwrap()
    }

    /// Bucket the writer places a full row in.
    pub fn bucket_of(&self, row: &Row) -> BucketId {
        let extractor = FixedBucketExtractor::new(&self.descriptor).unwrap();
        extractor.bucket(&self.primary_key(row)).unwrap()
    }

    /// Store a file's rows without publishing it.
    pub fn write_file(&self, name: &str, rows: Vec<Row>) -> DataFileMeta {
        let meta = DataFileMeta::new(name).with_stats(rows.len() as u64, 0);
        self.shared.lock().files.insert(name.to_string(), rows);
        meta
    }

    /// A file diff for one bucket of the unpartitioned table.
    pub fn diff(&self, bucket: BucketId, before: &[DataFileMeta], after: &[DataFileMeta]) -> Split {
        let mut shared = self.shared.lock();
        shared.snapshot_id += 1;
        Split::Data(DataSplit {
            snapshot_id: shared.snapshot_id,
            partition: Row::empty(),
            bucket,
            before_files: before.to_vec(),
            data_files: after.to_vec(),
        })
    }

    /// Queue a batch for the file-monitor scan.
    pub fn push_batch(&self, splits: Vec<Split>) {
        self.shared.lock().pending.push_back(splits);
    }

    /// Write rows as one new file per touched bucket and publish them
    /// as a single batch.
    pub fn commit(&self, rows: Vec<Row>) -> Vec<DataFileMeta> {
        let mut by_bucket: BTreeMap<BucketId, Vec<Row>> = BTreeMap::new();
        for row in rows {
            by_bucket.entry(self.bucket_of(&row)).or_default().push(row);
        }

        let mut written = Vec::new();
        let mut splits = Vec::new();
        for (bucket, rows) in by_bucket {
            let name = self.next_file_name(bucket);
            let meta = self.write_file(&name, rows);
            self.shared
                .lock()
                .live
                .entry((Row::empty(), bucket))
                .or_default()
                .push(meta.clone());
            splits.push(self.diff(bucket, &[], std::slice::from_ref(&meta)));
            written.push(meta);
        }
        self.push_batch(splits);
        written
    }

    /// Merge a bucket's live files into one level-1 file and publish the
    /// swap.
    pub fn compact(&self, bucket: BucketId) -> DataFileMeta {
        let old = self
            .shared
            .lock()
            .live
            .remove(&(Row::empty(), bucket))
            .unwrap_or_default();

        let mut merged: HashMap<Row, Row> = HashMap::new();
        {
            let shared = self.shared.lock();
            for meta in &old {
                for row in &shared.files[&meta.file_name] {
                    merged.insert(self.primary_key(row), row.clone());
                }
            }
        }

        let name = self.next_file_name(bucket);
        let meta = self
            .write_file(&name, merged.into_values().collect())
            .with_level(1);
        self.shared
            .lock()
            .live
            .insert((Row::empty(), bucket), vec![meta.clone()]);
        let split = self.diff(bucket, &old, std::slice::from_ref(&meta));
        self.push_batch(vec![split]);
        meta
    }

    fn next_file_name(&self, bucket: BucketId) -> String {
        let mut shared = self.shared.lock();
        shared.next_file += 1;
        format!("bucket-{bucket}/data-{}.orc", shared.next_file)
    }

    /// Newest row with primary key `key` among `files` (oldest first).
    fn find(
        &self,
        shared: &Shared,
        files: &[String],
        key: &Row,
        projection: &[usize],
    ) -> Option<Row> {
        files.iter().rev().find_map(|name| {
            shared.files.get(name).and_then(|rows| {
                rows.iter()
                    .rev()
                    .find(|row| &self.primary_key(row) == key)
                    .map(|row| row.project(projection).unwrap())
            })
        })
    }
}

impl TableStore for MemoryTable {
    fn descriptor(&self) -> &TableDescriptor {
        &self.descriptor
    }

    fn new_local_query(&self) -> Result<Box<dyn LocalTableQuery>> {
        self.shared.lock().calls.local_created += 1;
        Ok(Box::new(MemoryLocalQuery::new(self.clone())))
    }

    fn new_file_monitor_scan(&self) -> Result<Box<dyn FileChangeSource>> {
        self.shared.lock().calls.scans_created += 1;
        Ok(Box::new(MemoryScan::new(self.clone())))
    }

    fn new_remote_query(&self) -> Result<Box<dyn RemoteTableQuery>> {
        self.shared.lock().calls.remote_created += 1;
        Ok(Box::new(MemoryRemoteQuery::new(self.clone())))
    }
}

/// File-monitor scan draining the table's queued batches.
pub struct MemoryScan {
    table: MemoryTable,
}

impl MemoryScan {
    pub fn new(table: MemoryTable) -> Self {
        Self { table }
    }
}

impl FileChangeSource for MemoryScan {
    fn plan(&mut self) -> Result<Vec<Split>> {
        let mut shared = self.table.shared.lock();
        shared.calls.plans += 1;
        Ok(shared.pending.pop_front().unwrap_or_default())
    }
}

/// Local engine reading only the files installed through diffs.
pub struct MemoryLocalQuery {
    table: MemoryTable,
    installed: HashMap<(PartitionValue, BucketId), Vec<String>>,
    projection: Vec<usize>,
}

impl MemoryLocalQuery {
    pub fn new(table: MemoryTable) -> Self {
        let projection = (0..table.descriptor.fields.len()).collect();
        Self {
            table,
            installed: HashMap::new(),
            projection,
        }
    }
}

impl LocalTableQuery for MemoryLocalQuery {
    fn with_value_projection(&mut self, projection: &[usize]) {
        self.projection = projection.to_vec();
    }

    fn with_io_dir(&mut self, dir: &Path) -> Result<()> {
        let mut shared = self.table.shared.lock();
        shared.calls.io_dirs += 1;
        if !dir.is_dir() {
            return Err(LookupError::Storage(format!(
                "io dir {} does not exist",
                dir.display()
            )));
        }
        shared.io_dirs.push(dir.to_path_buf());
        Ok(())
    }

    fn refresh_files(
        &mut self,
        partition: &PartitionValue,
        bucket: BucketId,
        before: &[DataFileMeta],
        after: &[DataFileMeta],
    ) -> Result<()> {
        self.table.shared.lock().calls.refresh_files += 1;
        let files = self.installed.entry((partition.clone(), bucket)).or_default();
        files.retain(|name| {
            !before.iter().any(|f| &f.file_name == name)
                && !after.iter().any(|f| &f.file_name == name)
        });
        files.extend(after.iter().map(|f| f.file_name.clone()));
        Ok(())
    }

    fn lookup(
        &mut self,
        partition: &PartitionValue,
        bucket: BucketId,
        key: &Row,
    ) -> Result<Option<Row>> {
        let mut shared = self.table.shared.lock();
        shared.calls.local_lookups += 1;
        if shared.fail_lookups {
            return Err(LookupError::Storage("injected lookup failure".into()));
        }
        let Some(files) = self.installed.get(&(partition.clone(), bucket)) else {
            return Ok(None);
        };
        Ok(self.table.find(&shared, files, key, &self.projection))
    }

    fn close(&mut self) -> Result<()> {
        self.table.shared.lock().calls.local_closes += 1;
        self.installed.clear();
        Ok(())
    }
}

/// Remote service answering from the writer's live files.
pub struct MemoryRemoteQuery {
    table: MemoryTable,
    projection: Vec<usize>,
}

impl MemoryRemoteQuery {
    pub fn new(table: MemoryTable) -> Self {
        let projection = (0..table.descriptor.fields.len()).collect();
        Self { table, projection }
    }
}

impl RemoteTableQuery for MemoryRemoteQuery {
    fn with_value_projection(&mut self, projection: &[usize]) {
        self.projection = projection.to_vec();
    }

    fn lookup(
        &mut self,
        partition: &PartitionValue,
        bucket: BucketId,
        key: &Row,
    ) -> Result<Option<Row>> {
        let mut shared = self.table.shared.lock();
        shared.calls.remote_lookups += 1;
        if shared.fail_lookups {
            return Err(LookupError::Connection("injected transport failure".into()));
        }
        let files: Vec<String> = shared
            .live
            .get(&(partition.clone(), bucket))
            .map(|metas| metas.iter().map(|m| m.file_name.clone()).collect())
            .unwrap_or_default();
        Ok(self.table.find(&shared, &files, key, &self.projection))
    }

    fn close(&mut self) -> Result<()> {
        self.table.shared.lock().calls.remote_closes += 1;
        Ok(())
    }
}
