//! Lookup table counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one lookup table.
#[derive(Debug, Default)]
pub struct LookupMetrics {
    /// `get` calls that reached the executor.
    pub lookups: AtomicU64,
    /// Lookups that returned a row.
    pub hits: AtomicU64,
    /// Lookups that returned nothing.
    pub misses: AtomicU64,
    /// Lookups that failed.
    pub errors: AtomicU64,
    /// Completed refreshes (including the one in `open`).
    pub refreshes: AtomicU64,
    /// File-set diffs applied across all refreshes.
    pub splits_applied: AtomicU64,
}

/// Snapshot of [`LookupMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupMetricsSnapshot {
    /// `get` calls that reached the executor.
    pub lookups: u64,
    /// Lookups that returned a row.
    pub hits: u64,
    /// Lookups that returned nothing.
    pub misses: u64,
    /// Lookups that failed.
    pub errors: u64,
    /// Completed refreshes.
    pub refreshes: u64,
    /// File-set diffs applied.
    pub splits_applied: u64,
}

impl LookupMetrics {
    pub(crate) fn record_lookup(&self, found: bool) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_error(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refresh(&self, splits: u64) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        self.splits_applied.fetch_add(splits, Ordering::Relaxed);
    }

    /// Take a snapshot of the current metrics.
    #[must_use]
    pub fn snapshot(&self) -> LookupMetricsSnapshot {
        use std::sync::atomic::Ordering::Relaxed;
        LookupMetricsSnapshot {
            lookups: self.lookups.load(Relaxed),
            hits: self.hits.load(Relaxed),
            misses: self.misses.load(Relaxed),
            errors: self.errors.load(Relaxed),
            refreshes: self.refreshes.load(Relaxed),
            splits_applied: self.splits_applied.load(Relaxed),
        }
    }
}

impl LookupMetricsSnapshot {
    /// Fraction of successful lookups that hit, or 0 with no lookups.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let answered = self.hits + self.misses;
        if answered == 0 {
            0.0
        } else {
            self.hits as f64 / answered as f64
        }
    }
}
