//! Strata structured error code registry.
//!
//! Every [`LookupError`](crate::LookupError) carries a stable `STR-NNNN`
//! code that is:
//! - Present in the error message (grep-able in logs)
//! - Present in the source code (grep-able in code)
//! - Stable across versions (codes are never reused)
//!
//! # Code Ranges
//!
//! | Range | Category |
//! |-------|----------|
//! | `STR-0xxx` | Configuration (raised at construction) |
//! | `STR-1xxx` | Key routing |
//! | `STR-2xxx` | Refresh / change-source contract |
//! | `STR-5xxx` | Storage engine / remote service I/O |
//! | `STR-8xxx` | Lifecycle misuse |

// ── Configuration (STR-0xxx) ──

/// The table has partition keys; only unpartitioned tables are supported.
pub const PARTITIONED_TABLE: &str = "STR-0001";
/// The table's bucket mode is not fixed-bucket.
pub const UNSUPPORTED_BUCKET_MODE: &str = "STR-0002";
/// Any other invalid construction-time setting.
pub const INVALID_CONFIG: &str = "STR-0003";

// ── Key routing (STR-1xxx) ──

/// Probe row column count differs from the join key.
pub const KEY_ARITY: &str = "STR-1001";

// ── Refresh (STR-2xxx) ──

/// Change source produced a split that is not a single-bucket file diff.
pub const UNSUPPORTED_SPLIT: &str = "STR-2001";

// ── Storage / I/O (STR-5xxx) ──

/// Local storage engine failure.
pub const STORAGE_ERROR: &str = "STR-5001";
/// Remote query service transport failure.
pub const CONNECTION_FAILED: &str = "STR-5002";
/// Filesystem error (working directory).
pub const IO_ERROR: &str = "STR-5003";

// ── Lifecycle (STR-8xxx) ──

/// Operation invoked in the wrong lifecycle state.
pub const INVALID_STATE: &str = "STR-8001";
