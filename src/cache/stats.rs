//! Cache Statistics Module
//!
//! Tracks read outcomes and maintenance work, and reports table sizes.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of cache metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of reads that returned a live value
    pub hits: u64,
    /// Number of reads that found nothing live (absent or expired)
    pub misses: u64,
    /// Number of completed expiration sweeps
    pub sweeps: u64,
    /// Number of entries reclaimed by sweeps
    pub reclaimed: u64,
    /// Rows currently in the value table
    pub value_rows: u64,
    /// Rows currently in the expiry table
    pub expiry_rows: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Counters ==
/// Lock-free counters shared by the store and its background sweeps.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sweeps: AtomicU64,
    reclaimed: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sweep(&self, reclaimed: usize) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.reclaimed.fetch_add(reclaimed as u64, Ordering::Relaxed);
    }

    /// Snapshot of the counters; row counts are filled in by the caller.
    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
            ..CacheStats::default()
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let stats = StatsCounters::default().snapshot();
        assert_eq!(stats, CacheStats::default());
    }

    #[test]
    fn test_stats_serialize_field_names() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            sweeps: 2,
            reclaimed: 7,
            value_rows: 5,
            expiry_rows: 5,
        };

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "hits": 3,
                "misses": 1,
                "sweeps": 2,
                "reclaimed": 7,
                "value_rows": 5,
                "expiry_rows": 5
            })
        );
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let counters = StatsCounters::default();
        counters.record_hit();
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();

        let stats = counters.snapshot();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_record_sweep() {
        let counters = StatsCounters::default();
        counters.record_sweep(4);
        counters.record_sweep(0);

        let stats = counters.snapshot();
        assert_eq!(stats.sweeps, 2);
        assert_eq!(stats.reclaimed, 4);
    }
}
