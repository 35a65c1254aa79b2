use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{HeimdallError, Result};
use crate::model::{LogEntry, Query, QueryResult, StorageTier};

use super::adapter::{matches_query, Capability, StorageAdapter, StorageStats};

const CAPABILITIES: &[Capability] = &[Capability::Search, Capability::TimeRangePruning];

/// Columns a generated warm-tier query is allowed to reference (spec.md
/// §4.4: "only a whitelist of table/column identifiers is permitted ...
/// every identifier passing into generated DDL/DML is validated against
/// that whitelist"). `Query.filters[].field` is checked against this list
/// before it is allowed to participate in tier selection.
const COLUMN_WHITELIST: &[&str] =
    &["source.service", "level", "timestamp", "security.classification"];

fn validate_identifier(field: &str) -> Result<()> {
    if COLUMN_WHITELIST.contains(&field) {
        Ok(())
    } else {
        Err(HeimdallError::Validation(format!(
            "filter field '{field}' is not a whitelisted warm-tier column"
        )))
    }
}

fn month_partition(timestamp_ns: i64) -> String {
    let dt: DateTime<Utc> = DateTime::from_timestamp_nanos(timestamp_ns);
    dt.format("%Y%m").to_string()
}

/// Columnar, compressed, partitioned-by-month tier (spec.md §4.4 "Warm
/// tier"). Entries within a partition are kept ordered by
/// `(service, level, timestamp)` to mirror the real engine's sort key, so
/// range scans over a partition don't need a secondary sort.
pub struct WarmAdapter {
    partitions: RwLock<HashMap<String, Vec<LogEntry>>>,
}

impl WarmAdapter {
    pub fn new() -> Self {
        Self { partitions: RwLock::new(HashMap::new()) }
    }

    fn sort_key(entry: &LogEntry) -> (String, crate::model::Severity, i64) {
        (entry.source.service.clone(), entry.level, entry.timestamp)
    }

    fn insert_sorted(partition: &mut Vec<LogEntry>, entry: LogEntry) {
        let key = Self::sort_key(&entry);
        let pos = partition.partition_point(|e| Self::sort_key(e) < key);
        partition.insert(pos, entry);
    }
}

impl Default for WarmAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for WarmAdapter {
    fn tier(&self) -> StorageTier {
        StorageTier::Warm
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    async fn store(&self, entry: LogEntry) -> Result<()> {
        let partition = month_partition(entry.timestamp);
        let mut partitions = self.partitions.write();
        Self::insert_sorted(partitions.entry(partition).or_default(), entry);
        Ok(())
    }

    async fn store_batch(&self, entries: Vec<LogEntry>) -> Result<()> {
        let mut partitions = self.partitions.write();
        for entry in entries {
            let partition = month_partition(entry.timestamp);
            Self::insert_sorted(partitions.entry(partition).or_default(), entry);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<QueryResult> {
        for filter in &query.filters {
            validate_identifier(&filter.field)?;
        }
        let partitions = self.partitions.read();
        let logs: Vec<LogEntry> = partitions
            .values()
            .flatten()
            .filter(|e| matches_query(e, query))
            .cloned()
            .collect();
        let total = logs.len();
        Ok(QueryResult { logs, total, ..QueryResult::empty() })
    }

    async fn drain_older_than(&self, older_than_ns: i64, limit: usize) -> Result<Vec<LogEntry>> {
        let mut partitions = self.partitions.write();
        let mut drained = Vec::new();
        for entries in partitions.values_mut() {
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
        partitions.retain(|_, v| !v.is_empty());
        Ok(drained)
    }

    async fn stats(&self) -> Result<StorageStats> {
        let partitions = self.partitions.read();
        let mut entry_count = 0u64;
        let mut oldest = None;
        let mut newest = None;
        for entry in partitions.values().flatten() {
            entry_count += 1;
            oldest = Some(oldest.map_or(entry.timestamp, |o: i64| o.min(entry.timestamp)));
            newest = Some(newest.map_or(entry.timestamp, |n: i64| n.max(entry.timestamp)));
        }
        Ok(StorageStats {
            tier: Some(StorageTier::Warm),
            entry_count,
            bytes: entry_count * 256,
            oldest_timestamp: oldest,
            newest_timestamp: newest,
            segment_count: partitions.len() as u64,
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
