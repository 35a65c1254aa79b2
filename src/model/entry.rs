use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enumerated severity (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// `{service, instance, region, environment, service_version, hostname}`;
/// `service` is the only required field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceInfo {
    pub service: String,
    pub instance: Option<String>,
    pub region: Option<String>,
    pub environment: Option<String>,
    pub service_version: Option<String>,
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageBody {
    pub raw: String,
    pub template: Option<String>,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub flags: Option<u32>,
}

/// Optional correlation ids (spec.md §3: `entities`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitiesRef {
    pub user: Option<String>,
    pub session: Option<String>,
    pub request: Option<String>,
    pub customer: Option<String>,
    pub correlation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsAnnotation {
    pub duration_ms: Option<f64>,
    pub cpu_usage: Option<f64>,
    pub memory_bytes: Option<u64>,
    pub error_rate: Option<f64>,
    pub throughput: Option<f64>,
}

/// `security.classification` is required; defaults to `"public"` by the
/// ingestion pipeline's validation step (spec.md §4.7) if absent on the
/// wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    pub classification: String,
    pub retention_policy: Option<String>,
    #[serde(default)]
    pub pii_fields: Vec<String>,
    #[serde(default)]
    pub access_groups: Vec<String>,
}

impl Default for SecurityContext {
    fn default() -> Self {
        Self {
            classification: "public".to_string(),
            retention_policy: None,
            pii_fields: Vec::new(),
            access_groups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MlEnrichment {
    pub anomaly_score: Option<f64>,
    pub predicted_category: Option<String>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(default)]
    pub related_patterns: Vec<String>,
}

/// `{name, engine, connection descriptor, retention window, tier config}`
/// is folded into `StorageAdapter`/`StorageManagerConfig`; this enum is the
/// `storage.tier` discriminant carried on each `LogEntry` plus the tier
/// registry key (spec.md §3 `StorageTier`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    Hot,
    Warm,
    Cold,
}

impl StorageTier {
    /// Ordering used by multi-tier merge tie-breaking: hot > warm > cold
    /// (spec.md §4.4 "warmest wins").
    pub fn warmth(&self) -> u8 {
        match self {
            StorageTier::Hot => 2,
            StorageTier::Warm => 1,
            StorageTier::Cold => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageTier::Hot => "hot",
            StorageTier::Warm => "warm",
            StorageTier::Cold => "cold",
        }
    }
}

/// Filled in by the pipeline, never trusted from the producer (spec.md §3
/// invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageInfo {
    pub tier: StorageTier,
    pub compressed: bool,
    pub indexed: bool,
}

impl Default for StorageInfo {
    fn default() -> Self {
        Self { tier: StorageTier::Hot, compressed: false, indexed: false }
    }
}

/// The canonical ingested event (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    /// Nanoseconds since the Unix epoch. Assigned or validated by the
    /// pipeline; never trusted raw from the producer for ordering
    /// decisions (spec.md §3 invariant).
    pub timestamp: i64,
    pub version: u32,
    pub level: Severity,
    pub source: SourceInfo,
    pub message: MessageBody,
    pub trace: Option<TraceContext>,
    #[serde(default)]
    pub entities: Option<EntitiesRef>,
    #[serde(default)]
    pub metrics: Option<MetricsAnnotation>,
    #[serde(default)]
    pub security: SecurityContext,
    #[serde(default)]
    pub ml: Option<MlEnrichment>,
    #[serde(default)]
    pub storage: StorageInfo,
}

impl LogEntry {
    /// Upper bound on `message.raw` enforced by ingestion validation
    /// (spec.md §4.7).
    pub const MAX_MESSAGE_LEN: usize = 32 * 1024;

    pub fn new(service: impl Into<String>, level: Severity, raw: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: 0,
            version: 1,
            level,
            source: SourceInfo { service: service.into(), ..Default::default() },
            message: MessageBody { raw: raw.into(), ..Default::default() },
            trace: None,
            entities: None,
            metrics: None,
            security: SecurityContext::default(),
            ml: None,
            storage: StorageInfo::default(),
        }
    }
}
