use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;
use crate::model::{CacheStrategy, Priority, Query, QueryResult};
use crate::resource_manager::{PressureLevel, PressureListener, ResourceUsage};

use super::entry::{compress, decompress, estimate_size, CacheEntry, CacheLevel, Payload};
use super::stats::{CacheStats, CacheStatsCounters, EvictionReason};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_bytes: u64,
    pub default_ttl: Duration,
    /// Fraction of `max_bytes` L1 may occupy (spec.md §4.6, default 0.3).
    pub l1_ratio: f64,
    pub compression_threshold_bytes: u64,
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 100 * 1024 * 1024,
            default_ttl: Duration::from_secs(5 * 60),
            l1_ratio: 0.3,
            compression_threshold_bytes: 1024 * 1024,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_bytes == 0 {
            return Err(crate::error::HeimdallError::Configuration(
                "max_bytes must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.l1_ratio) {
            return Err(crate::error::HeimdallError::Configuration(
                "l1_ratio must be within [0.0, 1.0]".to_string(),
            ));
        }
        Ok(())
    }

    fn l1_budget(&self) -> u64 {
        (self.max_bytes as f64 * self.l1_ratio) as u64
    }
}

/// `set()` options (spec.md §4.6 `set(query, result, {priority, tags,
/// ttl})`).
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub priority: Priority,
    pub tags: Vec<String>,
    pub ttl: Option<Duration>,
}

/// Two-level in-process query result cache (spec.md §4.6).
///
/// L1 and L2 entries share a single map and a single eviction candidate
/// pool, keyed by [`Query::fingerprint`], so a HIGH-priority L2 entry can
/// outlive a LOW-priority L1 entry during eviction. Grounded on the
/// teacher's `QueryCache` (`cache/query_cache.rs`): same
/// hashmap-plus-LRU-queue-plus-table-dependency-index shape, generalized
/// from a single LRU tier to the spec's priority/size placement and
/// promotion rules, and from SQL-table invalidation to free-form tag
/// invalidation.
pub struct QueryCache {
    config: CacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    tag_index: RwLock<HashMap<String, HashSet<String>>>,
    total_bytes: RwLock<u64>,
    l1_bytes: RwLock<u64>,
    stats: CacheStatsCounters,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            tag_index: RwLock::new(HashMap::new()),
            total_bytes: RwLock::new(0),
            l1_bytes: RwLock::new(0),
            stats: CacheStatsCounters::default(),
        }
    }

    /// L1 first, then L2; an L2 hit is decompressed and promoted to L1
    /// when it now fits and qualifies (spec.md §4.6).
    pub fn get(&self, query: &Query) -> Option<QueryResult> {
        let key = query.fingerprint();

        {
            let mut entries = self.entries.write();
            if let Some(entry) = entries.get(&key) {
                if entry.is_expired() {
                    let entry = entries.remove(&key).unwrap();
                    self.on_removed(&key, &entry, EvictionReason::Expired);
                    self.stats.record_miss();
                    return None;
                }
            } else {
                self.stats.record_miss();
                return None;
            }

            let entry = entries.get_mut(&key).unwrap();
            entry.mark_accessed();

            if entry.level == CacheLevel::L1 {
                self.stats.record_l1_hit();
                let Payload::Raw(result) = &entry.payload else {
                    unreachable!("L1 entries are always stored uncompressed")
                };
                return Some(result.clone());
            }
        }

        // L2 hit: decompress outside the write lock held above, then
        // consider promotion to L1.
        self.stats.record_l2_hit();
        let (result, qualifies) = {
            let entries = self.entries.read();
            let entry = entries.get(&key)?;
            let result = match &entry.payload {
                Payload::Compressed { bytes } => decompress(bytes).ok()?,
                Payload::Raw(result) => result.clone(),
            };
            let qualifies = entry.priority >= Priority::High || entry.access_count > 3;
            (result, qualifies)
        };

        if qualifies {
            self.try_promote_to_l1(&key, &result);
        }
        Some(result)
    }

    fn try_promote_to_l1(&self, key: &str, result: &QueryResult) {
        let size = estimate_size(result);
        let mut l1_bytes = self.l1_bytes.write();
        if *l1_bytes + size > self.config.l1_budget() {
            return;
        }
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(key) {
            if entry.level == CacheLevel::L1 {
                return;
            }
            let old_size = entry.payload.size_bytes();
            entry.payload = Payload::Raw(result.clone());
            entry.level = CacheLevel::L1;
            *l1_bytes += size;
            let mut total = self.total_bytes.write();
            *total = total.saturating_sub(old_size) + size;
        }
    }

    /// Places the entry in L1 or L2 per the spec's placement rules,
    /// evicting from the shared candidate pool if needed (spec.md §4.6).
    pub fn set(&self, query: &Query, result: QueryResult, opts: SetOptions) {
        let key = query.fingerprint();
        let ttl = self.effective_ttl(query, opts.ttl);
        if ttl.is_zero() {
            // `bypass` strategy: not cached.
            return;
        }

        let prior_access_count =
            self.entries.read().get(&key).map(|e| e.access_count).unwrap_or(0);

        let raw_size = estimate_size(&result);
        let place_in_l1 = opts.priority >= Priority::High
            || prior_access_count > 3
            || (raw_size < self.config.compression_threshold_bytes
                && *self.l1_bytes.read() + raw_size <= self.config.l1_budget());

        let (payload, level, size) = if place_in_l1 {
            (Payload::Raw(result), CacheLevel::L1, raw_size)
        } else if raw_size > self.config.compression_threshold_bytes {
            match compress(&result) {
                Ok(bytes) => {
                    let compressed_size = bytes.len() as u64;
                    if compressed_size < raw_size {
                        self.stats.record_compression_savings(raw_size - compressed_size);
                    }
                    (Payload::Compressed { bytes }, CacheLevel::L2, compressed_size)
                }
                Err(_) => (Payload::Raw(result), CacheLevel::L2, raw_size),
            }
        } else {
            (Payload::Raw(result), CacheLevel::L2, raw_size)
        };

        self.ensure_capacity(size);

        let entry = CacheEntry {
            payload,
            level,
            priority: opts.priority,
            tags: opts.tags.clone(),
            created_at: Instant::now(),
            ttl,
            last_accessed: Instant::now(),
            access_count: prior_access_count,
        };

        let mut entries = self.entries.write();
        if let Some(old) = entries.insert(key.clone(), entry) {
            self.untrack(&key, &old);
        }
        drop(entries);

        *self.total_bytes.write() += size;
        if level == CacheLevel::L1 {
            *self.l1_bytes.write() += size;
        }

        let mut tag_index = self.tag_index.write();
        for tag in &opts.tags {
            tag_index.entry(tag.clone()).or_default().insert(key.clone());
        }
    }

    fn effective_ttl(&self, query: &Query, override_ttl: Option<Duration>) -> Duration {
        if let Some(ttl) = override_ttl {
            return ttl;
        }
        match query.hints.cache_strategy {
            CacheStrategy::Bypass => Duration::ZERO,
            CacheStrategy::Aggressive => Duration::from_secs(10 * 60),
            CacheStrategy::Default => self.config.default_ttl,
        }
    }

    /// Evicts from the shared L1+L2 candidate pool, ordered by
    /// `(priority ascending, last_accessed ascending)`, until `incoming`
    /// bytes fit under `max_bytes` (spec.md §4.6 "Eviction").
    fn ensure_capacity(&self, incoming: u64) {
        loop {
            if *self.total_bytes.read() + incoming <= self.config.max_bytes {
                return;
            }
            let victim = {
                let entries = self.entries.read();
                entries
                    .iter()
                    .min_by(|(_, a), (_, b)| {
                        a.priority.cmp(&b.priority).then(a.last_accessed.cmp(&b.last_accessed))
                    })
                    .map(|(k, _)| k.clone())
            };
            match victim {
                Some(key) => {
                    let mut entries = self.entries.write();
                    if let Some(entry) = entries.remove(&key) {
                        self.on_removed(&key, &entry, EvictionReason::SizePressure);
                    }
                }
                None => return,
            }
        }
    }

    fn on_removed(&self, key: &str, entry: &CacheEntry, reason: EvictionReason) {
        let size = entry.payload.size_bytes();
        *self.total_bytes.write() = self.total_bytes.read().saturating_sub(size);
        if entry.level == CacheLevel::L1 {
            *self.l1_bytes.write() = self.l1_bytes.read().saturating_sub(size);
        }
        self.untrack(key, entry);
        self.stats.record_eviction(reason);
    }

    fn untrack(&self, key: &str, entry: &CacheEntry) {
        let mut tag_index = self.tag_index.write();
        for tag in &entry.tags {
            if let Some(keys) = tag_index.get_mut(tag) {
                keys.remove(key);
            }
        }
    }

    /// Invalidates every entry tagged with any of `tags` (spec.md §4.6,
    /// testable property 3).
    pub fn invalidate_by_tags(&self, tags: &[String]) {
        let keys: HashSet<String> = {
            let tag_index = self.tag_index.read();
            tags.iter()
                .filter_map(|t| tag_index.get(t))
                .flat_map(|keys| keys.iter().cloned())
                .collect()
        };
        let mut entries = self.entries.write();
        for key in keys {
            if let Some(entry) = entries.remove(&key) {
                drop(entries);
                self.on_removed(&key, &entry, EvictionReason::TagInvalidation);
                entries = self.entries.write();
            }
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        self.tag_index.write().clear();
        *self.total_bytes.write() = 0;
        *self.l1_bytes.write() = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let entry_count = self.entries.read().len();
        self.stats.snapshot(entry_count, *self.total_bytes.read())
    }

    /// Drops expired entries proactively; runs on `cleanup_interval`
    /// (spec.md §4.6 "swept by a background task").
    pub fn sweep_expired(&self) {
        let expired: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| e.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        let mut entries = self.entries.write();
        for key in expired {
            if let Some(entry) = entries.remove(&key) {
                drop(entries);
                self.on_removed(&key, &entry, EvictionReason::Expired);
                entries = self.entries.write();
            }
        }
    }

    pub fn spawn_cleanup_task(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep_expired();
            }
        })
    }
}

#[async_trait]
impl PressureListener for QueryCache {
    /// Sheds resident state under memory pressure (spec.md §4.2:
    /// "Subscribed caches MUST reduce their resident set"). Evicts the
    /// coldest quarter of entries by the same
    /// `(priority, last_accessed)` ordering `ensure_capacity` uses.
    async fn on_pressure(&self, level: PressureLevel, _usage: &ResourceUsage) {
        let fraction = match level {
            PressureLevel::Warning => 0.1,
            PressureLevel::Critical => 0.25,
        };
        let to_evict = ((self.entries.read().len() as f64) * fraction).ceil() as usize;
        if to_evict == 0 {
            return;
        }
        let victims: Vec<String> = {
            let entries = self.entries.read();
            let mut sorted: Vec<(&String, &CacheEntry)> = entries.iter().collect();
            sorted.sort_by(|(_, a), (_, b)| {
                a.priority.cmp(&b.priority).then(a.last_accessed.cmp(&b.last_accessed))
            });
            sorted.into_iter().take(to_evict).map(|(k, _)| k.clone()).collect()
        };
        let mut entries = self.entries.write();
        for key in victims {
            if let Some(entry) = entries.remove(&key) {
                drop(entries);
                self.on_removed(&key, &entry, EvictionReason::ResourcePressure);
                entries = self.entries.write();
            }
        }
    }
}
