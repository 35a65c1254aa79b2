use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters surfaced through `metrics()` (spec.md §6:
/// `pool_active_connections`, `pool_idle_connections`).
#[derive(Default)]
pub struct PoolMetrics {
    acquires: AtomicU64,
    releases: AtomicU64,
    create_failures: AtomicU64,
    destroys: AtomicU64,
}

impl PoolMetrics {
    pub fn record_acquire(&self) {
        self.acquires.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_create_failure(&self) {
        self.create_failures.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_destroy(&self) {
        self.destroys.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            acquires: self.acquires.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            create_failures: self.create_failures.load(Ordering::Relaxed),
            destroys: self.destroys.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolMetricsSnapshot {
    pub acquires: u64,
    pub releases: u64,
    pub create_failures: u64,
    pub destroys: u64,
}
