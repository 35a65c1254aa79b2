use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{LogEntry, Query, QueryResult, StorageTier};

/// Capabilities a tier adapter declares so the Storage Manager can decide
/// how to route a query before calling it (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Search,
    Aggregations,
    TextSearch,
    TimeRangePruning,
    Restore,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub tier: Option<StorageTier>,
    pub entry_count: u64,
    pub bytes: u64,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
    pub segment_count: u64,
}

/// Shared contract every tier backend implements (spec.md §4.4).
///
/// Adapters are polymorphic over [`Capability`]; the Storage Manager
/// inspects `capabilities()` before routing a query rather than assuming
/// every tier can serve every request (e.g. cold lacks `text_search`).
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    fn tier(&self) -> StorageTier;

    fn capabilities(&self) -> &'static [Capability];

    async fn store(&self, entry: LogEntry) -> Result<()>;

    async fn store_batch(&self, entries: Vec<LogEntry>) -> Result<()>;

    async fn query(&self, query: &Query) -> Result<QueryResult>;

    /// Entries with `timestamp < older_than_ns`, used by the lifecycle
    /// migrator (spec.md §4.5) to read a bounded chunk for migration.
    async fn drain_older_than(&self, older_than_ns: i64, limit: usize) -> Result<Vec<LogEntry>>;

    async fn stats(&self) -> Result<StorageStats>;

    /// Asynchronous rehydration for backends whose storage class requires
    /// it before the entries become queryable again (spec.md §4.4, cold
    /// tier only). Adapters that don't declare `Capability::Restore`
    /// return `Ok(())` immediately.
    async fn restore(&self, _object_key: &str) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()>;
}

pub(crate) fn matches_query(entry: &LogEntry, query: &Query) -> bool {
    if entry.timestamp < query.time_range.from || entry.timestamp > query.time_range.to {
        return false;
    }
    if !query.levels.is_empty() && !query.levels.contains(&entry.level) {
        return false;
    }
    if !query.sources.is_empty() && !query.sources.contains(&entry.source.service) {
        return false;
    }
    if let Some(text) = &query.text_search {
        if !entry.message.raw.to_lowercase().contains(&text.to_lowercase()) {
            return false;
        }
    }
    for filter in &query.filters {
        if !structured_filter_matches(entry, filter) {
            return false;
        }
    }
    true
}

fn structured_filter_matches(entry: &LogEntry, filter: &crate::model::StructuredFilter) -> bool {
    let actual = match filter.field.as_str() {
        "source.service" => serde_json::Value::String(entry.source.service.clone()),
        "security.classification" => serde_json::Value::String(entry.security.classification.clone()),
        "level" => serde_json::to_value(entry.level).unwrap(),
        _ => return true,
    };
    match filter.operator.as_str() {
        "eq" => actual == filter.value,
        "ne" => actual != filter.value,
        _ => true,
    }
}
