//! Canonical data model for the Heimdall core (spec.md §3).
//!
//! `LogEntry` is the unit ingested, stored, queried, and streamed by every
//! other module in this crate. The rest of this module defines the
//! supporting value types referenced from its fields.

mod entry;
mod priority;
mod query;
mod result;

pub use entry::{
    EntitiesRef, LogEntry, MessageBody, MetricsAnnotation, MlEnrichment, SecurityContext,
    Severity, SourceInfo, StorageInfo, StorageTier, TraceContext,
};
pub use query::{
    Aggregation, AggregationKind, CacheStrategy, Query, QueryHints, SortOrder, StructuredFilter,
    TimeRange,
};
pub use priority::Priority;
pub use result::{AggregationBucket, AggregationValue, QueryPerformance, QueryResult};
