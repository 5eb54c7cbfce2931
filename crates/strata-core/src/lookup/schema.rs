//! Table descriptors: schema, keys and bucketing.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::lookup::source::{LookupError, Result};

/// Table option holding the bucket count.
pub const BUCKET_OPTION: &str = "bucket";
/// Table option holding comma-separated bucket-key columns.
pub const BUCKET_KEY_OPTION: &str = "bucket-key";

/// `bucket` value selecting dynamic bucketing.
const DYNAMIC_BUCKET: i64 = -1;
/// `bucket` value selecting postponed bucket assignment.
const POSTPONE_BUCKET: i64 = -2;

/// How rows are assigned to buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum BucketMode {
    /// Statically configured bucket count; bucket = hash(bucket key) mod count.
    Fixed {
        /// Buckets per partition.
        num_buckets: u32,
    },
    /// Bucket count grows per partition; assignment kept in an index.
    Dynamic,
    /// Dynamic buckets where a key may move across partitions.
    CrossPartition,
    /// Append-only table without bucket assignment.
    Unaware,
    /// Bucket assignment deferred to compaction.
    Postpone,
}

impl fmt::Display for BucketMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed { num_buckets } => write!(f, "fixed({num_buckets})"),
            Self::Dynamic => write!(f, "dynamic"),
            Self::CrossPartition => write!(f, "cross-partition"),
            Self::Unaware => write!(f, "unaware"),
            Self::Postpone => write!(f, "postpone"),
        }
    }
}

/// Schema-level description of a primary-key table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name (for errors and logging).
    pub name: String,
    /// All field names in schema order.
    pub fields: Vec<String>,
    /// Primary-key columns in canonical order.
    pub primary_keys: Vec<String>,
    /// Partition columns (empty for unpartitioned tables).
    #[serde(default)]
    pub partition_keys: Vec<String>,
    /// Explicit bucket-key columns; empty selects the default.
    #[serde(default)]
    pub bucket_keys: Vec<String>,
    /// Bucket assignment mode.
    pub bucket_mode: BucketMode,
}

impl TableDescriptor {
    /// An unpartitioned table with a single fixed bucket.
    pub fn new(
        name: impl Into<String>,
        fields: Vec<String>,
        primary_keys: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            fields,
            primary_keys,
            partition_keys: Vec::new(),
            bucket_keys: Vec::new(),
            bucket_mode: BucketMode::Fixed { num_buckets: 1 },
        }
    }

    /// Set the partition columns.
    #[must_use]
    pub fn with_partition_keys(mut self, partition_keys: Vec<String>) -> Self {
        self.partition_keys = partition_keys;
        self
    }

    /// Set explicit bucket-key columns.
    #[must_use]
    pub fn with_bucket_keys(mut self, bucket_keys: Vec<String>) -> Self {
        self.bucket_keys = bucket_keys;
        self
    }

    /// Set the bucket mode.
    #[must_use]
    pub fn with_bucket_mode(mut self, bucket_mode: BucketMode) -> Self {
        self.bucket_mode = bucket_mode;
        self
    }

    /// Build a descriptor from table storage options.
    ///
    /// # Recognized keys
    ///
    /// - `bucket`: `> 0` fixed count, `-1` dynamic, `-2` postpone
    ///   (default `-1`); tables without a primary key are unaware unless
    ///   the count is positive
    /// - `bucket-key`: comma-separated bucket-key columns
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::InvalidConfig`] for unparsable or
    /// out-of-range values.
    pub fn from_options(
        name: impl Into<String>,
        fields: Vec<String>,
        primary_keys: Vec<String>,
        partition_keys: Vec<String>,
        options: &HashMap<String, String>,
    ) -> Result<Self> {
        let bucket = match options.get(BUCKET_OPTION) {
            Some(v) => v.trim().parse::<i64>().map_err(|_| {
                LookupError::InvalidConfig(format!("invalid {BUCKET_OPTION}: '{v}'"))
            })?,
            None => DYNAMIC_BUCKET,
        };

        let bucket_keys: Vec<String> = options
            .get(BUCKET_KEY_OPTION)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let bucket_mode = match bucket {
            n if n > 0 => BucketMode::Fixed {
                num_buckets: u32::try_from(n).map_err(|_| {
                    LookupError::InvalidConfig(format!("{BUCKET_OPTION} too large: {n}"))
                })?,
            },
            _ if primary_keys.is_empty() => BucketMode::Unaware,
            DYNAMIC_BUCKET => {
                if partition_keys.iter().all(|p| primary_keys.contains(p)) {
                    BucketMode::Dynamic
                } else {
                    BucketMode::CrossPartition
                }
            }
            POSTPONE_BUCKET => BucketMode::Postpone,
            n => {
                return Err(LookupError::InvalidConfig(format!(
                    "invalid {BUCKET_OPTION}: {n} (expected > 0, -1 or -2)"
                )))
            }
        };

        Ok(Self {
            name: name.into(),
            fields,
            primary_keys,
            partition_keys,
            bucket_keys,
            bucket_mode,
        })
    }

    /// Effective bucket-key columns.
    ///
    /// Defaults to the primary key minus partition columns.
    #[must_use]
    pub fn bucket_keys(&self) -> Vec<String> {
        if self.bucket_keys.is_empty() {
            self.primary_keys
                .iter()
                .filter(|k| !self.partition_keys.contains(k))
                .cloned()
                .collect()
        } else {
            self.bucket_keys.clone()
        }
    }

    /// Position of `name` in the schema.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    /// Check internal consistency of the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::InvalidConfig`] if the table has no primary
    /// key, a field name repeats, or a key column is not a field.
    pub fn validate(&self) -> Result<()> {
        if self.primary_keys.is_empty() {
            return Err(LookupError::InvalidConfig(format!(
                "table '{}' has no primary key",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.as_str()) {
                return Err(LookupError::InvalidConfig(format!(
                    "duplicate field '{field}' in table '{}'",
                    self.name
                )));
            }
        }

        let keys = self
            .primary_keys
            .iter()
            .chain(&self.partition_keys)
            .chain(&self.bucket_keys);
        for key in keys {
            if !seen.contains(key.as_str()) {
                return Err(LookupError::InvalidConfig(format!(
                    "key column '{key}' is not a field of table '{}'",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| (*s).to_string()).collect()
    }

    fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_fixed_bucket_from_options() {
        let desc = TableDescriptor::from_options(
            "dim",
            names(&["id", "name"]),
            names(&["id"]),
            vec![],
            &options(&[("bucket", "4")]),
        )
        .unwrap();
        assert_eq!(desc.bucket_mode, BucketMode::Fixed { num_buckets: 4 });
        assert_eq!(desc.bucket_keys(), names(&["id"]));
    }

    #[test]
    fn test_bucket_default_is_dynamic() {
        let desc = TableDescriptor::from_options(
            "dim",
            names(&["id"]),
            names(&["id"]),
            vec![],
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(desc.bucket_mode, BucketMode::Dynamic);
    }

    #[test]
    fn test_cross_partition_mode() {
        let desc = TableDescriptor::from_options(
            "dim",
            names(&["id", "dt"]),
            names(&["id"]),
            names(&["dt"]),
            &options(&[("bucket", "-1")]),
        )
        .unwrap();
        assert_eq!(desc.bucket_mode, BucketMode::CrossPartition);
    }

    #[test]
    fn test_postpone_and_unaware_modes() {
        let postpone = TableDescriptor::from_options(
            "dim",
            names(&["id"]),
            names(&["id"]),
            vec![],
            &options(&[("bucket", "-2")]),
        )
        .unwrap();
        assert_eq!(postpone.bucket_mode, BucketMode::Postpone);

        let unaware = TableDescriptor::from_options(
            "log",
            names(&["msg"]),
            vec![],
            vec![],
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(unaware.bucket_mode, BucketMode::Unaware);
    }

    #[test]
    fn test_fixed_append_table_fails_validation() {
        let append = TableDescriptor::from_options(
            "log",
            names(&["msg"]),
            vec![],
            vec![],
            &options(&[("bucket", "4")]),
        )
        .unwrap();
        assert_eq!(append.bucket_mode, BucketMode::Fixed { num_buckets: 4 });
        let err = append.validate().unwrap_err();
        assert!(err.to_string().contains("no primary key"), "{err}");
    }

    #[test]
    fn test_invalid_bucket_values() {
        for bad in ["0", "-3", "four"] {
            let err = TableDescriptor::from_options(
                "dim",
                names(&["id"]),
                names(&["id"]),
                vec![],
                &options(&[("bucket", bad)]),
            )
            .unwrap_err();
            assert!(err.is_config(), "{bad}: {err}");
        }
    }

    #[test]
    fn test_bucket_key_option() {
        let desc = TableDescriptor::from_options(
            "dim",
            names(&["a", "b", "c"]),
            names(&["a", "b"]),
            vec![],
            &options(&[("bucket", "2"), ("bucket-key", " b , ")]),
        )
        .unwrap();
        assert_eq!(desc.bucket_keys(), names(&["b"]));
    }

    #[test]
    fn test_default_bucket_keys_exclude_partitions() {
        let desc = TableDescriptor::new("t", names(&["dt", "id"]), names(&["dt", "id"]))
            .with_partition_keys(names(&["dt"]));
        assert_eq!(desc.bucket_keys(), names(&["id"]));
    }

    #[test]
    fn test_validate() {
        let ok = TableDescriptor::new("t", names(&["id", "v"]), names(&["id"]));
        assert!(ok.validate().is_ok());

        let no_pk = TableDescriptor::new("t", names(&["id"]), vec![]);
        assert!(no_pk.validate().is_err());

        let dup = TableDescriptor::new("t", names(&["id", "id"]), names(&["id"]));
        assert!(dup.validate().is_err());

        let missing = TableDescriptor::new("t", names(&["id"]), names(&["key"]));
        assert!(missing.validate().is_err());

        let bad_bucket_key = TableDescriptor::new("t", names(&["id"]), names(&["id"]))
            .with_bucket_keys(names(&["x"]));
        assert!(bad_bucket_key.validate().is_err());
    }

    #[test]
    fn test_bucket_mode_display() {
        assert_eq!(BucketMode::Fixed { num_buckets: 8 }.to_string(), "fixed(8)");
        assert_eq!(BucketMode::CrossPartition.to_string(), "cross-partition");
    }
}
