//! Lookup table configuration.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::lookup::schema::TableDescriptor;
use crate::lookup::source::{LookupError, Result};

/// Option selecting the query strategy (`local` or `remote`).
pub const QUERY_MODE_OPTION: &str = "lookup.query-mode";
/// Option selecting the parent of the local working directory.
pub const TMP_DIR_OPTION: &str = "lookup.tmp-dir";

/// Where lookups are answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Mirror bucket file sets locally and query them in-process.
    #[default]
    Local,
    /// Forward every lookup to a remote query service.
    Remote,
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for QueryMode {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(LookupError::InvalidConfig(format!(
                "invalid {QUERY_MODE_OPTION}: '{other}' (expected 'local' or 'remote')"
            ))),
        }
    }
}

/// Configuration for a primary-key lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupTableConfig {
    /// Query strategy.
    pub query_mode: QueryMode,
    /// Columns, in probe order, of the rows passed to `get`.
    /// Empty means the table's primary key.
    pub join_key: Vec<String>,
    /// Field indices of the returned value rows. Empty means all fields.
    pub projection: Vec<usize>,
    /// Parent directory of the local executor's working directory.
    pub temp_dir: PathBuf,
}

impl Default for LookupTableConfig {
    fn default() -> Self {
        Self {
            query_mode: QueryMode::Local,
            join_key: Vec::new(),
            projection: Vec::new(),
            temp_dir: std::env::temp_dir(),
        }
    }
}

impl LookupTableConfig {
    /// Config probing with `join_key`, otherwise default.
    #[must_use]
    pub fn new(join_key: Vec<String>) -> Self {
        Self {
            join_key,
            ..Self::default()
        }
    }

    /// Parse the `lookup.*` table options.
    ///
    /// Unrecognized keys are ignored so the full table option map can be
    /// passed in.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::InvalidConfig`] for an unknown query mode
    /// or an empty temp dir.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(mode) = options.get(QUERY_MODE_OPTION) {
            config.query_mode = mode.parse()?;
        }
        if let Some(dir) = options.get(TMP_DIR_OPTION) {
            let dir = dir.trim();
            if dir.is_empty() {
                return Err(LookupError::InvalidConfig(format!(
                    "{TMP_DIR_OPTION} must not be empty"
                )));
            }
            config.temp_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    /// Set the query strategy.
    #[must_use]
    pub fn with_query_mode(mut self, query_mode: QueryMode) -> Self {
        self.query_mode = query_mode;
        self
    }

    /// Set the join-key columns.
    #[must_use]
    pub fn with_join_key(mut self, join_key: Vec<String>) -> Self {
        self.join_key = join_key;
        self
    }

    /// Set the value projection.
    #[must_use]
    pub fn with_projection(mut self, projection: Vec<usize>) -> Self {
        self.projection = projection;
        self
    }

    /// Set the working directory parent.
    #[must_use]
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    /// Effective join key for `descriptor`.
    #[must_use]
    pub fn join_key_for(&self, descriptor: &TableDescriptor) -> Vec<String> {
        if self.join_key.is_empty() {
            descriptor.primary_keys.clone()
        } else {
            self.join_key.clone()
        }
    }

    /// Effective value projection for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::InvalidConfig`] if an index is not a field
    /// of the table.
    pub fn resolved_projection(&self, descriptor: &TableDescriptor) -> Result<Vec<usize>> {
        if self.projection.is_empty() {
            return Ok((0..descriptor.fields.len()).collect());
        }
        if let Some(&bad) = self
            .projection
            .iter()
            .find(|&&i| i >= descriptor.fields.len())
        {
            return Err(LookupError::InvalidConfig(format!(
                "projection index {bad} out of range for table '{}' with {} fields",
                descriptor.name,
                descriptor.fields.len()
            )));
        }
        Ok(self.projection.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> TableDescriptor {
        TableDescriptor::new(
            "dim",
            vec!["id".into(), "name".into(), "price".into()],
            vec!["id".into()],
        )
    }

    #[test]
    fn test_defaults() {
        let config = LookupTableConfig::default();
        assert_eq!(config.query_mode, QueryMode::Local);
        assert!(config.join_key.is_empty());
        assert_eq!(config.temp_dir, std::env::temp_dir());
        assert_eq!(config.join_key_for(&descriptor()), vec!["id".to_string()]);
        assert_eq!(config.resolved_projection(&descriptor()).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_from_options() {
        let options: HashMap<String, String> = [
            (QUERY_MODE_OPTION.to_string(), "Remote".to_string()),
            (TMP_DIR_OPTION.to_string(), "/var/tmp/lookup".to_string()),
            ("bucket".to_string(), "4".to_string()),
        ]
        .into_iter()
        .collect();

        let config = LookupTableConfig::from_options(&options).unwrap();
        assert_eq!(config.query_mode, QueryMode::Remote);
        assert_eq!(config.temp_dir, PathBuf::from("/var/tmp/lookup"));
    }

    #[test]
    fn test_invalid_options() {
        let bad_mode: HashMap<String, String> =
            [(QUERY_MODE_OPTION.to_string(), "hybrid".to_string())].into();
        assert!(LookupTableConfig::from_options(&bad_mode)
            .unwrap_err()
            .is_config());

        let empty_dir: HashMap<String, String> =
            [(TMP_DIR_OPTION.to_string(), " ".to_string())].into();
        assert!(LookupTableConfig::from_options(&empty_dir).is_err());
    }

    #[test]
    fn test_projection_out_of_range() {
        let config = LookupTableConfig::default().with_projection(vec![2, 3]);
        let err = config.resolved_projection(&descriptor()).unwrap_err();
        assert!(err.to_string().contains("projection index 3"));

        let ok = LookupTableConfig::default().with_projection(vec![2, 0]);
        assert_eq!(ok.resolved_projection(&descriptor()).unwrap(), vec![2, 0]);
    }

    #[test]
    fn test_query_mode_display_round_trip() {
        for mode in [QueryMode::Local, QueryMode::Remote] {
            assert_eq!(mode.to_string().parse::<QueryMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: LookupTableConfig =
            serde_json::from_str(r#"{"query_mode":"remote","join_key":["b","a"]}"#).unwrap();
        assert_eq!(config.query_mode, QueryMode::Remote);
        assert_eq!(config.join_key, vec!["b".to_string(), "a".to_string()]);
        assert!(config.projection.is_empty());
    }
}
