use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::Result;
use crate::model::{LogEntry, Query, QueryResult, StorageTier};

use super::adapter::{matches_query, Capability, StorageAdapter, StorageStats};

const CAPABILITIES: &[Capability] = &[
    Capability::Search,
    Capability::TextSearch,
    Capability::TimeRangePruning,
];

fn day_segment(timestamp_ns: i64) -> String {
    let dt: DateTime<Utc> = DateTime::from_timestamp_nanos(timestamp_ns);
    dt.format("prefix-%Y-%m-%d").to_string()
}

/// Low-latency append/range-by-timestamp tier, segmented by day (spec.md
/// §4.4 "Hot tier"). Batch writes are grouped by destination segment before
/// being applied, mirroring the bulk-operation framing of a real index
/// adapter without pulling in a concrete search-engine client.
pub struct HotAdapter {
    segments: RwLock<HashMap<String, Vec<LogEntry>>>,
}

impl HotAdapter {
    pub fn new() -> Self {
        Self { segments: RwLock::new(HashMap::new()) }
    }

    fn insert(&self, entry: LogEntry) {
        let segment = day_segment(entry.timestamp);
        self.segments.write().entry(segment).or_default().push(entry);
    }
}

impl Default for HotAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for HotAdapter {
    fn tier(&self) -> StorageTier {
        StorageTier::Hot
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    async fn store(&self, entry: LogEntry) -> Result<()> {
        self.insert(entry);
        Ok(())
    }

    async fn store_batch(&self, entries: Vec<LogEntry>) -> Result<()> {
        let mut by_segment: HashMap<String, Vec<LogEntry>> = HashMap::new();
        for entry in entries {
            by_segment.entry(day_segment(entry.timestamp)).or_default().push(entry);
        }
        let mut segments = self.segments.write();
        for (segment, mut batch) in by_segment {
            segments.entry(segment).or_default().append(&mut batch);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<QueryResult> {
        let segments = self.segments.read();
        let logs: Vec<LogEntry> = segments
            .values()
            .flatten()
            .filter(|e| matches_query(e, query))
            .cloned()
            .collect();
        let total = logs.len();
        Ok(QueryResult { logs, total, ..QueryResult::empty() })
    }

    async fn drain_older_than(&self, older_than_ns: i64, limit: usize) -> Result<Vec<LogEntry>> {
        let mut segments = self.segments.write();
        let mut drained = Vec::new();
        for entries in segments.values_mut() {
            let mut i = 0;
            while i < entries.len() && drained.len() < limit {
                if entries[i].timestamp < older_than_ns {
                    drained.push(entries.remove(i));
                } else {
                    i += 1;
                }
            }
            if drained.len() >= limit {
                break;
            }
        }
        segments.retain(|_, v| !v.is_empty());
        Ok(drained)
    }

    async fn stats(&self) -> Result<StorageStats> {
        let segments = self.segments.read();
        let mut entry_count = 0u64;
        let mut oldest = None;
        let mut newest = None;
        for entry in segments.values().flatten() {
            entry_count += 1;
            oldest = Some(oldest.map_or(entry.timestamp, |o: i64| o.min(entry.timestamp)));
            newest = Some(newest.map_or(entry.timestamp, |n: i64| n.max(entry.timestamp)));
        }
        Ok(StorageStats {
            tier: Some(StorageTier::Hot),
            entry_count,
            bytes: entry_count * 512,
            oldest_timestamp: oldest,
            newest_timestamp: newest,
            segment_count: segments.len() as u64,
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
