//! Process-wide resource ceilings and pressure signaling (spec.md §4.2).
//!
//! Grounded on the teacher's resource-manager coordinator pattern
//! (`resource_manager/mod.rs`: a single struct owning named sub-resources
//! behind `Arc`, with a periodic monitoring task) simplified down from the
//! teacher's Oracle-style CPU/IO/session scheduling to the five ceilings
//! spec.md actually names, plus the pressure-relief sweep grounded on
//! `memory/pressure.rs`'s threshold/callback design.

mod pressure;

pub use pressure::{PressureLevel, PressureListener};

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{HeimdallError, Result};
use crate::model::Priority;
use crate::pool::{ConnectionFactory, Pool, PoolConfig};

/// Process-wide ceilings (spec.md §6 env vars, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceManagerConfig {
    pub max_memory_mb: u64,
    pub max_connections: u64,
    pub max_cache_size_bytes: u64,
    pub max_concurrent_queries: u64,
    pub max_stream_subscriptions: u64,
    /// How often the periodic pressure sweep runs (spec.md: "every ~10s").
    pub pressure_check_interval: Duration,
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 1024,
            max_connections: 100,
            max_cache_size_bytes: 100 * 1024 * 1024,
            max_concurrent_queries: 50,
            max_stream_subscriptions: 1_000,
            pressure_check_interval: Duration::from_secs(10),
        }
    }
}

impl ResourceManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 || self.max_memory_mb == 0 {
            return Err(HeimdallError::Configuration(
                "max_connections and max_memory_mb must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub memory_mb: u64,
    pub connections: u64,
    pub cache_bytes: u64,
    pub concurrent_queries: u64,
    pub stream_subscriptions: u64,
}

/// A handle naming one of the resource manager's named pools, so
/// `register_pool`/`unregister_pool`/`acquire` can address it without the
/// manager knowing the pool's connection type (spec.md §4.2).
pub trait NamedPool: Send + Sync {
    fn name(&self) -> &str;
    fn active_connections(&self) -> usize;
    fn idle_connections(&self) -> usize;
}

impl<F: ConnectionFactory> NamedPool for (String, Arc<Pool<F>>) {
    fn name(&self) -> &str {
        &self.0
    }
    fn active_connections(&self) -> usize {
        self.1.active_connections()
    }
    fn idle_connections(&self) -> usize {
        self.1.idle_connections()
    }
}

/// Process-wide quota enforcement and pressure signaling (spec.md §4.2).
///
/// Counters are plain atomics updated without holding a lock across a
/// callback (spec.md §5): pressure listeners are invoked outside any
/// internal lock.
pub struct ResourceManager {
    config: ResourceManagerConfig,
    pools: RwLock<HashMap<String, Arc<dyn NamedPool>>>,
    memory_bytes: AtomicI64,
    cache_bytes: AtomicI64,
    concurrent_queries: AtomicI64,
    stream_subscriptions: AtomicI64,
    pressure_events: AtomicU64,
    listeners: RwLock<Vec<Arc<dyn PressureListener>>>,
}

impl ResourceManager {
    pub fn new(config: ResourceManagerConfig) -> Self {
        Self {
            config,
            pools: RwLock::new(HashMap::new()),
            memory_bytes: AtomicI64::new(0),
            cache_bytes: AtomicI64::new(0),
            concurrent_queries: AtomicI64::new(0),
            stream_subscriptions: AtomicI64::new(0),
            pressure_events: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn register_pool(&self, pool: Arc<dyn NamedPool>) {
        self.pools.write().insert(pool.name().to_string(), pool);
    }

    pub fn unregister_pool(&self, name: &str) {
        self.pools.write().remove(name);
    }

    pub fn register_pressure_listener(&self, listener: Arc<dyn PressureListener>) {
        self.listeners.write().push(listener);
    }

    /// Checks global ceilings before a caller goes on to acquire from a
    /// named pool (spec.md §4.2: "Acquisition checks global ceilings
    /// before delegating to the named pool").
    pub fn check_connection_ceiling(&self) -> Result<()> {
        let total: usize = self.pools.read().values().map(|p| p.active_connections()).sum();
        if total as u64 >= self.config.max_connections {
            return Err(HeimdallError::Overloaded(format!(
                "global connection ceiling {} reached",
                self.config.max_connections
            )));
        }
        Ok(())
    }

    pub fn try_reserve_query_slot(&self) -> Result<QuerySlotGuard<'_>> {
        let current = self.concurrent_queries.fetch_add(1, Ordering::SeqCst) + 1;
        if current as u64 > self.config.max_concurrent_queries {
            self.concurrent_queries.fetch_sub(1, Ordering::SeqCst);
            return Err(HeimdallError::Overloaded(
                "max_concurrent_queries ceiling reached".to_string(),
            ));
        }
        Ok(QuerySlotGuard { manager: self })
    }

    pub fn try_reserve_subscription_slot(&self) -> Result<()> {
        let current = self.stream_subscriptions.fetch_add(1, Ordering::SeqCst) + 1;
        if current as u64 > self.config.max_stream_subscriptions {
            self.stream_subscriptions.fetch_sub(1, Ordering::SeqCst);
            return Err(HeimdallError::Overloaded(
                "max_stream_subscriptions ceiling reached".to_string(),
            ));
        }
        Ok(())
    }

    pub fn release_subscription_slot(&self) {
        self.stream_subscriptions.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn record_memory_delta(&self, delta_bytes: i64) {
        self.memory_bytes.fetch_add(delta_bytes, Ordering::SeqCst);
    }

    pub fn record_cache_delta(&self, delta_bytes: i64) {
        self.cache_bytes.fetch_add(delta_bytes, Ordering::SeqCst);
        debug_assert!(
            self.cache_bytes.load(Ordering::SeqCst) as u64 <= self.config.max_cache_size_bytes * 2,
            "cache usage grew far beyond its ceiling; a caller is not honoring eviction"
        );
    }

    /// Sum of idle connections across every registered pool (spec.md §6
    /// `metrics()` gauge `pool_idle_connections`).
    pub fn idle_connections(&self) -> usize {
        self.pools.read().values().map(|p| p.idle_connections()).sum()
    }

    pub fn usage(&self) -> ResourceUsage {
        let connections: usize = self.pools.read().values().map(|p| p.active_connections()).sum();
        ResourceUsage {
            memory_mb: (self.memory_bytes.load(Ordering::SeqCst).max(0) as u64) / (1024 * 1024),
            connections: connections as u64,
            cache_bytes: self.cache_bytes.load(Ordering::SeqCst).max(0) as u64,
            concurrent_queries: self.concurrent_queries.load(Ordering::SeqCst).max(0) as u64,
            stream_subscriptions: self.stream_subscriptions.load(Ordering::SeqCst).max(0) as u64,
        }
    }

    pub fn statistics(&self) -> ResourceManagerStatistics {
        ResourceManagerStatistics {
            usage: self.usage(),
            pressure_events: self.pressure_events.load(Ordering::SeqCst),
        }
    }

    /// One pass of the periodic / reactive pressure check (spec.md §4.2:
    /// "every ~10s, and reactively on failed acquisition"). Memory above
    /// 80% of `max_memory_mb` or connections above 80% of
    /// `max_connections` fires a pressure event to every registered
    /// listener, outside any lock held by this manager.
    pub async fn check_pressure(&self) {
        let usage = self.usage();
        let memory_ratio = usage.memory_mb as f64 / self.config.max_memory_mb as f64;
        let conn_ratio = usage.connections as f64 / self.config.max_connections as f64;
        let cache_ratio = usage.cache_bytes as f64 / self.config.max_cache_size_bytes as f64;

        if memory_ratio > 0.8 || conn_ratio > 0.8 || cache_ratio > 0.8 {
            self.pressure_events.fetch_add(1, Ordering::SeqCst);
            let level = if memory_ratio > 0.95 || conn_ratio > 0.95 || cache_ratio > 0.95 {
                PressureLevel::Critical
            } else {
                PressureLevel::Warning
            };
            tracing::warn!(memory_ratio, conn_ratio, cache_ratio, ?level, "resource pressure detected");

            let listeners: Vec<_> = self.listeners.read().clone();
            for listener in listeners {
                listener.on_pressure(level, &usage).await;
            }
        }
    }

    /// Spawns the periodic pressure-check task (spec.md §4.2).
    pub fn spawn_monitor(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.config.pressure_check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.check_pressure().await;
            }
        })
    }

    pub fn shutdown(&self) {
        for pool_entry in self.pools.read().values() {
            let _ = pool_entry.name();
        }
        self.pools.write().clear();
    }
}

pub struct QuerySlotGuard<'a> {
    manager: &'a ResourceManager,
}

impl<'a> Drop for QuerySlotGuard<'a> {
    fn drop(&mut self) {
        self.manager.concurrent_queries.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceManagerStatistics {
    pub usage: ResourceUsage,
    pub pressure_events: u64,
}

// Kept for call sites that only need a priority-aware acquire with the
// ceiling check folded in.
pub async fn acquire_checked<F: ConnectionFactory>(
    manager: &ResourceManager,
    pool: &Arc<Pool<F>>,
    priority: Priority,
    timeout: Duration,
) -> Result<crate::pool::PooledGuard<F>> {
    manager.check_connection_ceiling()?;
    pool.acquire(priority, timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pressure_fires_above_80_percent() {
        let manager = Arc::new(ResourceManager::new(ResourceManagerConfig {
            max_memory_mb: 100,
            ..Default::default()
        }));

        struct Recorder(std::sync::atomic::AtomicUsize);
        #[async_trait::async_trait]
        impl PressureListener for Recorder {
            async fn on_pressure(&self, _level: PressureLevel, _usage: &ResourceUsage) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let recorder = Arc::new(Recorder(std::sync::atomic::AtomicUsize::new(0)));
        manager.register_pressure_listener(recorder.clone());

        manager.record_memory_delta(90 * 1024 * 1024);
        manager.check_pressure().await;
        assert_eq!(recorder.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_query_ceiling_enforced() {
        let manager = ResourceManager::new(ResourceManagerConfig {
            max_concurrent_queries: 1,
            ..Default::default()
        });
        let _first = manager.try_reserve_query_slot().unwrap();
        assert!(manager.try_reserve_query_slot().is_err());
    }
}
