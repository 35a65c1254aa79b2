use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{LogEntry, StorageTier};

/// Aggregation output bucket — a generic `terms`/`date_histogram` bucket or
/// a single scalar (`count`/`sum`/`avg`/`min`/`max`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregationValue {
    Scalar(f64),
    Buckets(Vec<AggregationBucket>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationBucket {
    pub key: String,
    pub count: u64,
    pub value: Option<f64>,
}

/// `performance` block of `QueryResult` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPerformance {
    /// Max across tiers, never the sum (spec.md §4.5, §9 redesign note b).
    pub took_ms: u64,
    pub timed_out: bool,
    pub cache_hit: bool,
    pub storage_accessed: Vec<StorageTier>,
    pub degraded: bool,
}

impl Default for QueryPerformance {
    fn default() -> Self {
        Self {
            took_ms: 0,
            timed_out: false,
            cache_hit: false,
            storage_accessed: Vec::new(),
            degraded: false,
        }
    }
}

/// `QueryResult` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub logs: Vec<LogEntry>,
    pub total: usize,
    pub aggregations: HashMap<String, AggregationValue>,
    pub performance: QueryPerformance,
    /// ML insights appended by the Query Service when `ml_features` was
    /// requested (spec.md §4.9 step 4); empty when not requested or the
    /// hook produced nothing.
    pub insights: Vec<String>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            logs: Vec::new(),
            total: 0,
            aggregations: HashMap::new(),
            performance: QueryPerformance::default(),
            insights: Vec::new(),
        }
    }
}
