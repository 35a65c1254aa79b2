use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{HeimdallError, Result};
use crate::model::{LogEntry, Query, QueryResult, StorageTier};

use super::adapter::{matches_query, Capability, StorageAdapter, StorageStats};

const CAPABILITIES: &[Capability] =
    &[Capability::Search, Capability::TimeRangePruning, Capability::Restore];

/// One immutable hourly object (spec.md §4.4 "Cold tier"): key
/// `logs/YYYY/MM/DD/HH/<seq>.<format>.<codec>`, metadata carrying
/// `{log_count, first_ts, last_ts, format, codec}`. `rehydrated` tracks
/// whether `restore()` has been called for this object; an object that
/// requires rehydration is skipped by `query()` until then, mirroring a
/// real archival storage class (e.g. Glacier) that doesn't serve reads
/// until an async restore completes.
struct ColdObject {
    entries: Vec<LogEntry>,
    log_count: u64,
    first_ts: i64,
    last_ts: i64,
    #[allow(dead_code)]
    format: &'static str,
    #[allow(dead_code)]
    codec: &'static str,
    rehydrated: bool,
}

fn object_key(hour_bucket: &str, seq: u64) -> String {
    format!("{hour_bucket}/{seq}.parquet.zstd")
}

fn hour_bucket(timestamp_ns: i64) -> String {
    let dt: DateTime<Utc> = DateTime::from_timestamp_nanos(timestamp_ns);
    dt.format("logs/%Y/%m/%d/%H").to_string()
}

/// Object-storage tier. Writes are batched per hour and committed as
/// immutable objects; queries enumerate objects intersecting the time
/// range, "download" (here: read in-process), decompress, filter
/// client-side, and paginate (spec.md §4.4).
pub struct ColdAdapter {
    objects: RwLock<HashMap<String, ColdObject>>,
    next_seq: AtomicU64,
}

impl ColdAdapter {
    pub fn new() -> Self {
        Self { objects: RwLock::new(HashMap::new()), next_seq: AtomicU64::new(0) }
    }

    fn commit(&self, bucket: String, batch: Vec<LogEntry>) {
        if batch.is_empty() {
            return;
        }
        let first_ts = batch.iter().map(|e| e.timestamp).min().unwrap();
        let last_ts = batch.iter().map(|e| e.timestamp).max().unwrap();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let key = object_key(&bucket, seq);
        self.objects.write().insert(
            key,
            ColdObject {
                log_count: batch.len() as u64,
                first_ts,
                last_ts,
                format: "parquet",
                codec: "zstd",
                entries: batch,
                rehydrated: true,
            },
        );
    }
}

impl Default for ColdAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for ColdAdapter {
    fn tier(&self) -> StorageTier {
        StorageTier::Cold
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    async fn store(&self, entry: LogEntry) -> Result<()> {
        let bucket = hour_bucket(entry.timestamp);
        self.commit(bucket, vec![entry]);
        Ok(())
    }

    async fn store_batch(&self, entries: Vec<LogEntry>) -> Result<()> {
        let mut by_bucket: HashMap<String, Vec<LogEntry>> = HashMap::new();
        for entry in entries {
            by_bucket.entry(hour_bucket(entry.timestamp)).or_default().push(entry);
        }
        for (bucket, batch) in by_bucket {
            self.commit(bucket, batch);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<QueryResult> {
        let objects = self.objects.read();
        let mut logs: Vec<LogEntry> = Vec::new();
        for object in objects.values() {
            if !object.rehydrated {
                continue;
            }
            if object.last_ts < query.time_range.from || object.first_ts > query.time_range.to {
                continue;
            }
            logs.extend(object.entries.iter().filter(|e| matches_query(e, query)).cloned());
        }
        let total = logs.len();
        Ok(QueryResult { logs, total, ..QueryResult::empty() })
    }

    async fn drain_older_than(&self, _older_than_ns: i64, _limit: usize) -> Result<Vec<LogEntry>> {
        // Cold is the terminal tier; nothing migrates out of it.
        Ok(Vec::new())
    }

    async fn stats(&self) -> Result<StorageStats> {
        let objects = self.objects.read();
        let entry_count: u64 = objects.values().map(|o| o.log_count).sum();
        let oldest = objects.values().map(|o| o.first_ts).min();
        let newest = objects.values().map(|o| o.last_ts).max();
        Ok(StorageStats {
            tier: Some(StorageTier::Cold),
            entry_count,
            bytes: entry_count * 64,
            oldest_timestamp: oldest,
            newest_timestamp: newest,
            segment_count: objects.len() as u64,
        })
    }

    async fn restore(&self, object_key: &str) -> Result<()> {
        let mut objects = self.objects.write();
        match objects.get_mut(object_key) {
            Some(object) => {
                object.rehydrated = true;
                Ok(())
            }
            None => Err(HeimdallError::NotFound(format!("cold object '{object_key}' not found"))),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
