use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionReason {
    Expired,
    SizePressure,
    TagInvalidation,
    ResourcePressure,
    Manual,
}

/// Cache-wide counters (spec.md §4.6 "Stats"). Kept as plain atomics so
/// `get`/`set` never take a lock purely to bump a counter.
#[derive(Default)]
pub struct CacheStatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    evictions: AtomicU64,
    compression_savings_bytes: AtomicU64,
}

impl CacheStatsCounters {
    pub fn record_l1_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_l2_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_eviction(&self, _reason: EvictionReason) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_compression_savings(&self, bytes: u64) {
        self.compression_savings_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self, entry_count: usize, total_bytes: u64) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let l1_hits = self.l1_hits.load(Ordering::Relaxed);
        let l2_hits = self.l2_hits.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            l1_hits,
            l2_hits,
            evictions: self.evictions.load(Ordering::Relaxed),
            compression_savings_bytes: self.compression_savings_bytes.load(Ordering::Relaxed),
            entry_count,
            total_bytes,
            hit_rate: ratio(hits, total),
            l1_hit_rate: ratio(l1_hits, total),
            l2_hit_rate: ratio(l2_hits, total),
        }
    }
}

fn ratio(n: u64, d: u64) -> f64 {
    if d == 0 {
        0.0
    } else {
        n as f64 / d as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub evictions: u64,
    pub compression_savings_bytes: u64,
    pub entry_count: usize,
    pub total_bytes: u64,
    pub hit_rate: f64,
    pub l1_hit_rate: f64,
    pub l2_hit_rate: f64,
}
