//! Key routing: join key → (partition, bucket, primary key).
//!
//! ## Key Routing
//!
//! 1. [`KeyRearrange`] reorders a join-key row into primary-key column
//!    order when the two orders differ.
//! 2. [`FixedBucketExtractor`] hashes the bucket-key columns of the
//!    primary-key row with xxh3 and reduces modulo the bucket count.
//!
//! Routing must match the writer exactly: the same key row always maps
//! to the same bucket, or lookups miss rows that exist.

use std::collections::HashSet;

use crate::lookup::encoding::encode_key;
use crate::lookup::row::Row;
use crate::lookup::schema::{BucketMode, TableDescriptor};
use crate::lookup::source::{LookupError, Result};

/// Row-shaped key identifying a table partition.
///
/// Always the empty row for the unpartitioned tables supported here.
pub type PartitionValue = Row;

/// Bucket index within a partition, in `0..num_buckets`.
pub type BucketId = u32;

/// Projection from join-key column order to primary-key column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRearrange {
    /// `projection[i]` = position of primary-key column `i` in the join key.
    projection: Vec<usize>,
    join_key_arity: usize,
}

impl KeyRearrange {
    /// Build the mapping, or `None` when both orders are identical.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::InvalidConfig`] if the join key repeats a
    /// column or does not contain every primary-key column.
    pub fn new(primary_keys: &[String], join_key: &[String]) -> Result<Option<Self>> {
        if primary_keys == join_key {
            return Ok(None);
        }

        let mut seen = HashSet::new();
        if let Some(dup) = join_key.iter().find(|k| !seen.insert(k.as_str())) {
            return Err(LookupError::InvalidConfig(format!(
                "duplicate column '{dup}' in join key {join_key:?}"
            )));
        }

        let projection = primary_keys
            .iter()
            .map(|pk| {
                join_key.iter().position(|k| k == pk).ok_or_else(|| {
                    LookupError::InvalidConfig(format!(
                        "join key {join_key:?} does not contain primary key column '{pk}'"
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Self {
            projection,
            join_key_arity: join_key.len(),
        }))
    }

    /// Join-key positions in primary-key order.
    #[must_use]
    pub fn projection(&self) -> &[usize] {
        &self.projection
    }

    /// Reorder a join-key row into primary-key order.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::KeyArity`] if `join_key_row` does not have
    /// the join key's column count.
    pub fn apply(&self, join_key_row: &Row) -> Result<Row> {
        if join_key_row.arity() != self.join_key_arity {
            return Err(LookupError::KeyArity {
                expected: self.join_key_arity,
                actual: join_key_row.arity(),
            });
        }
        join_key_row
            .project(&self.projection)
            .ok_or(LookupError::KeyArity {
                expected: self.join_key_arity,
                actual: join_key_row.arity(),
            })
    }
}

/// Derives partition and bucket from a primary-key row of an
/// unpartitioned fixed-bucket table.
///
/// Writers place rows with the same extractor, so it is public.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedBucketExtractor {
    num_buckets: u32,
    /// Positions of the bucket-key columns within the primary-key row.
    bucket_key_indices: Vec<usize>,
    primary_key_arity: usize,
}

impl FixedBucketExtractor {
    /// Create an extractor for `descriptor`.
    ///
    /// # Errors
    ///
    /// - [`LookupError::PartitionedTable`] if the table has partition keys
    /// - [`LookupError::UnsupportedBucketMode`] unless the mode is fixed
    /// - [`LookupError::InvalidConfig`] if the bucket count is zero or a
    ///   bucket-key column is not part of the primary key
    pub fn new(descriptor: &TableDescriptor) -> Result<Self> {
        let num_buckets = fixed_bucket_count(descriptor)?;
        if num_buckets == 0 {
            return Err(LookupError::InvalidConfig(format!(
                "table '{}' has a bucket count of zero",
                descriptor.name
            )));
        }

        let bucket_key_indices = descriptor
            .bucket_keys()
            .iter()
            .map(|bk| {
                descriptor
                    .primary_keys
                    .iter()
                    .position(|pk| pk == bk)
                    .ok_or_else(|| {
                        LookupError::InvalidConfig(format!(
                            "bucket key column '{bk}' is not part of the primary key {:?}",
                            descriptor.primary_keys
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        if bucket_key_indices.is_empty() {
            return Err(LookupError::InvalidConfig(format!(
                "table '{}' has no bucket key",
                descriptor.name
            )));
        }

        Ok(Self {
            num_buckets,
            bucket_key_indices,
            primary_key_arity: descriptor.primary_keys.len(),
        })
    }

    /// Configured bucket count.
    #[must_use]
    pub fn num_buckets(&self) -> u32 {
        self.num_buckets
    }

    /// Partition of a primary-key row.
    #[must_use]
    pub fn partition(&self, _primary_key: &Row) -> PartitionValue {
        Row::empty()
    }

    /// Bucket of a primary-key row.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::KeyArity`] if the row does not have the
    /// primary key's column count.
    pub fn bucket(&self, primary_key: &Row) -> Result<BucketId> {
        if primary_key.arity() != self.primary_key_arity {
            return Err(LookupError::KeyArity {
                expected: self.primary_key_arity,
                actual: primary_key.arity(),
            });
        }
        let encoded = encode_key(self.bucket_key_indices.iter().map(|&i| &primary_key[i]));
        Ok(bucket_for_hash(
            xxhash_rust::xxh3::xxh3_64(&encoded),
            self.num_buckets,
        ))
    }
}

/// Bucket count of an unpartitioned fixed-bucket table.
///
/// Runs before [`TableDescriptor::validate`].
fn fixed_bucket_count(descriptor: &TableDescriptor) -> Result<u32> {
    if !descriptor.partition_keys.is_empty() {
        return Err(LookupError::PartitionedTable {
            table: descriptor.name.clone(),
            partition_keys: descriptor.partition_keys.clone(),
        });
    }
    match descriptor.bucket_mode {
        BucketMode::Fixed { num_buckets } => Ok(num_buckets),
        mode => Err(LookupError::UnsupportedBucketMode {
            table: descriptor.name.clone(),
            mode,
        }),
    }
}

/// Reduce a key hash to a bucket.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn bucket_for_hash(hash: u64, num_buckets: u32) -> BucketId {
    (hash % u64::from(num_buckets)) as BucketId
}

/// A join key resolved to its storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedKey {
    /// Owning partition.
    pub partition: PartitionValue,
    /// Owning bucket.
    pub bucket: BucketId,
    /// The key in primary-key column order.
    pub key: Row,
}

/// Maps join-key rows to `(partition, bucket, primary key)`.
#[derive(Debug, Clone)]
pub struct KeyRouter {
    extractor: FixedBucketExtractor,
    rearrange: Option<KeyRearrange>,
}

impl KeyRouter {
    /// Validate `descriptor` and build a router for `join_key`.
    ///
    /// # Errors
    ///
    /// - [`LookupError::PartitionedTable`] if the table has partition keys
    /// - [`LookupError::UnsupportedBucketMode`] unless the mode is fixed
    /// - any other configuration error from [`TableDescriptor::validate`],
    ///   [`FixedBucketExtractor::new`] or [`KeyRearrange::new`]
    pub fn new(descriptor: &TableDescriptor, join_key: &[String]) -> Result<Self> {
        fixed_bucket_count(descriptor)?;
        descriptor.validate()?;
        let extractor = FixedBucketExtractor::new(descriptor)?;
        let rearrange = KeyRearrange::new(&descriptor.primary_keys, join_key)?;
        Ok(Self {
            extractor,
            rearrange,
        })
    }

    /// Route a join-key row.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::KeyArity`] if the row has the wrong number
    /// of columns.
    pub fn route(&self, join_key_row: &Row) -> Result<RoutedKey> {
        let key = match &self.rearrange {
            Some(rearrange) => rearrange.apply(join_key_row)?,
            None => join_key_row.clone(),
        };
        let bucket = self.extractor.bucket(&key)?;
        Ok(RoutedKey {
            partition: self.extractor.partition(&key),
            bucket,
            key,
        })
    }

    /// Whether join-key rows are reordered before routing.
    #[must_use]
    pub fn rearranges(&self) -> bool {
        self.rearrange.is_some()
    }

    /// The bucket extractor.
    #[must_use]
    pub fn extractor(&self) -> &FixedBucketExtractor {
        &self.extractor
    }
}
