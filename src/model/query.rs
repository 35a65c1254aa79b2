use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Severity;

/// `time_range`: `from` and `to` are nanosecond timestamps, `from <= to`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
}

impl TimeRange {
    pub fn is_valid(&self) -> bool {
        self.from <= self.to
    }

    /// Millisecond-precision endpoints, used by the fingerprint function so
    /// that sub-millisecond jitter in two logically-identical queries does
    /// not produce different cache keys.
    fn canonical_ms(&self) -> (i64, i64) {
        (self.from / 1_000_000, self.to / 1_000_000)
    }

    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_nanos((self.to - self.from).max(0) as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    TimestampAsc,
    TimestampDesc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredFilter {
    pub field: String,
    pub operator: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Terms,
    DateHistogram,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregation {
    pub kind: AggregationKind,
    pub field: Option<String>,
    /// Bucket width in milliseconds, for `date_histogram`.
    pub interval_ms: Option<i64>,
}

/// `hints.cache_strategy` (spec.md §3, §4.6, §4.9).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    #[default]
    Default,
    Aggressive,
    Bypass,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryHints {
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub cache_strategy: CacheStrategy,
}

/// A query against the storage hierarchy (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub time_range: TimeRange,
    pub natural_language: Option<String>,
    #[serde(default)]
    pub filters: Vec<StructuredFilter>,
    #[serde(default)]
    pub levels: Vec<Severity>,
    #[serde(default)]
    pub sources: Vec<String>,
    pub text_search: Option<String>,
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
    pub sort: Option<SortOrder>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    #[serde(default)]
    pub hints: QueryHints,
    #[serde(default)]
    pub ml_features: bool,
}

impl Query {
    /// Deterministic fingerprint (spec.md §3, testable property 4): two
    /// queries with structurally equal fields after canonicalization
    /// produce the same fingerprint, independent of filter/aggregation
    /// ordering or sub-millisecond time jitter.
    pub fn fingerprint(&self) -> String {
        let (from_ms, to_ms) = self.time_range.canonical_ms();

        let mut filters: Vec<String> = self
            .filters
            .iter()
            .map(|f| format!("{}:{}:{}", f.field, f.operator, f.value))
            .collect();
        filters.sort();

        let mut levels: Vec<&Severity> = self.levels.iter().collect();
        levels.sort_by_key(|l| format!("{:?}", l));

        let mut sources = self.sources.clone();
        sources.sort();

        let aggregations: Vec<String> = self
            .aggregations
            .iter()
            .map(|a| format!("{:?}:{:?}:{:?}", a.kind, a.field, a.interval_ms))
            .collect();

        let canonical_nl = self
            .natural_language
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        let canonical = format!(
            "nl={}|from={}|to={}|filters={:?}|levels={:?}|sources={:?}|text={:?}|aggs={:?}|sort={:?}|limit={:?}|offset={:?}|urgent={}|strategy={:?}",
            canonical_nl,
            from_ms,
            to_ms,
            filters,
            levels,
            sources,
            self.text_search,
            aggregations,
            self.sort,
            self.limit,
            self.offset,
            self.hints.urgent,
            self.hints.cache_strategy,
        );

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Derived tags attached to cache entries produced from this query
    /// (spec.md §4.6 invalidation). `service:<name>` per filtered source,
    /// plus a coarse `timerange:{short|medium|long}` bucket.
    pub fn derived_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .sources
            .iter()
            .map(|s| format!("service:{s}"))
            .collect();

        let secs = self.time_range.duration().as_secs();
        let bucket = if secs <= 3600 {
            "short"
        } else if secs <= 86_400 {
            "medium"
        } else {
            "long"
        };
        tags.push(format!("timerange:{bucket}"));
        tags
    }
}
