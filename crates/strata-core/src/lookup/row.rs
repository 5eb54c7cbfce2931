//! Row and scalar value types.
//!
//! A [`Row`] is an ordered, fixed-arity tuple of [`Datum`]s. Key rows,
//! partition values and value rows returned by query engines all share
//! this representation. Rows are immutable once built and cheap to clone
//! (the values live behind an `Arc`).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Index;
use std::sync::Arc;

use bytes::Bytes;

/// A single typed value inside a [`Row`].
///
/// Covers the value types a primary key or projected value column can
/// carry. Equality and hashing are total: floats compare by bit pattern,
/// so `NaN == NaN` and `0.0 != -0.0`.
#[derive(Debug, Clone)]
pub enum Datum {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer (covers i8/i16/i32/i64)
    Int64(i64),
    /// 64-bit float (covers f32/f64)
    Float64(f64),
    /// UTF-8 string
    Utf8(String),
    /// Raw binary data
    Binary(Bytes),
    /// Timestamp as microseconds since Unix epoch
    Timestamp(i64),
}

impl Datum {
    /// Returns `true` for [`Datum::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn tag(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int64(_) => 2,
            Self::Float64(_) => 3,
            Self::Utf8(_) => 4,
            Self::Binary(_) => 5,
            Self::Timestamp(_) => 6,
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) | (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a.to_bits() == b.to_bits(),
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Binary(a), Self::Binary(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Datum {}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int64(v) | Self::Timestamp(v) => v.hash(state),
            Self::Float64(v) => v.to_bits().hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Binary(v) => v.hash(state),
        }
    }
}

/// Key-log rendering: strings are quoted and escaped, binary is `0x` hex,
/// timestamps carry a `us` suffix.
impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => fmt::Display::fmt(v, f),
            Self::Int64(v) => fmt::Display::fmt(v, f),
            Self::Float64(v) => fmt::Display::fmt(v, f),
            Self::Utf8(v) => fmt::Debug::fmt(v, f),
            Self::Binary(bytes) => {
                f.write_str("0x")?;
                bytes.iter().try_for_each(|b| write!(f, "{b:02x}"))
            }
            Self::Timestamp(micros) => write!(f, "{micros}us"),
        }
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Datum {
    fn from(v: i32) -> Self {
        Self::Int64(i64::from(v))
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Self::Utf8(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Self::Utf8(v)
    }
}

impl From<Bytes> for Datum {
    fn from(v: Bytes) -> Self {
        Self::Binary(v)
    }
}

impl From<Vec<u8>> for Datum {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(v))
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// An ordered, fixed-arity tuple of [`Datum`]s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Row(Arc<[Datum]>);

impl Row {
    /// Create a row from its values.
    #[must_use]
    pub fn new(values: Vec<Datum>) -> Self {
        Self(values.into())
    }

    /// The zero-arity row (the partition value of an unpartitioned table).
    #[must_use]
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }

    /// Number of columns.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// Whether the row has zero columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value at column `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Datum> {
        self.0.get(index)
    }

    /// All values in column order.
    #[must_use]
    pub fn values(&self) -> &[Datum] {
        &self.0
    }

    /// Build a new row from the columns at `indices`, in that order.
    ///
    /// Returns `None` if any index is out of range.
    #[must_use]
    pub fn project(&self, indices: &[usize]) -> Option<Row> {
        indices
            .iter()
            .map(|&i| self.0.get(i).cloned())
            .collect::<Option<Vec<_>>>()
            .map(Row::new)
    }
}

impl Default for Row {
    fn default() -> Self {
        Self::empty()
    }
}

impl Index<usize> for Row {
    type Output = Datum;

    fn index(&self, index: usize) -> &Datum {
        &self.0[index]
    }
}

impl From<Vec<Datum>> for Row {
    fn from(values: Vec<Datum>) -> Self {
        Self::new(values)
    }
}

impl FromIterator<Datum> for Row {
    fn from_iter<I: IntoIterator<Item = Datum>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

/// Build a [`Row`] from values convertible into [`Datum`].
///
/// ```
/// use strata_core::row;
/// use strata_core::lookup::Datum;
///
/// let r = row![1, "alice", None::<i64>];
/// assert_eq!(r.arity(), 3);
/// assert_eq!(r[2], Datum::Null);
/// ```
#[macro_export]
macro_rules! row {
    () => {
        $crate::lookup::Row::empty()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::lookup::Row::new(vec![$($crate::lookup::Datum::from($value)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_float_equality_is_bitwise() {
        assert_eq!(Datum::Float64(f64::NAN), Datum::Float64(f64::NAN));
        assert_ne!(Datum::Float64(0.0), Datum::Float64(-0.0));
    }

    #[test]
    fn test_int_and_timestamp_differ() {
        assert_ne!(Datum::Int64(5), Datum::Timestamp(5));

        let mut set = HashSet::new();
        set.insert(Datum::Int64(5));
        assert!(!set.contains(&Datum::Timestamp(5)));
    }

    #[test]
    fn test_row_project() {
        let r = row![10, "b", true];
        assert_eq!(r.project(&[2, 0]), Some(row![true, 10]));
        assert_eq!(r.project(&[]), Some(Row::empty()));
        assert!(r.project(&[3]).is_none());
    }

    #[test]
    fn test_row_display() {
        let r = row![1, "x", None::<i64>];
        assert_eq!(r.to_string(), r#"(1, "x", null)"#);
        assert_eq!(Row::empty().to_string(), "()");
        assert_eq!(Datum::from(vec![0xab_u8, 0x01]).to_string(), "0xab01");
        assert_eq!(Datum::from("a\"b").to_string(), r#""a\"b""#);
        assert_eq!(Datum::Timestamp(-5).to_string(), "-5us");
    }

    #[test]
    fn test_empty_row() {
        let r = row![];
        assert!(r.is_empty());
        assert_eq!(r, Row::default());
        assert_eq!(r.arity(), 0);
    }
}
