//! Two-level in-process query result cache (spec.md §4.6).

mod entry;
mod stats;
mod store;

pub use stats::{CacheStats, EvictionReason};
pub use store::{CacheConfig, QueryCache, SetOptions};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::{Priority, Query, QueryHints, QueryResult, TimeRange};

    fn sample_query() -> Query {
        Query {
            time_range: TimeRange { from: 0, to: 1_000_000_000 },
            natural_language: None,
            filters: Vec::new(),
            levels: Vec::new(),
            sources: vec!["auth".to_string()],
            text_search: None,
            aggregations: Vec::new(),
            sort: None,
            limit: None,
            offset: None,
            hints: QueryHints::default(),
            ml_features: false,
        }
    }

    #[test]
    fn miss_then_hit_then_tag_invalidation() {
        let cache = QueryCache::new(CacheConfig::default());
        let query = sample_query();

        assert!(cache.get(&query).is_none());

        cache.set(
            &query,
            QueryResult::empty(),
            SetOptions { priority: Priority::Normal, tags: query.derived_tags(), ttl: None },
        );
        assert!(cache.get(&query).is_some());

        cache.invalidate_by_tags(&["service:auth".to_string()]);
        assert!(cache.get(&query).is_none());
    }

    #[test]
    fn bypass_strategy_never_caches() {
        let cache = QueryCache::new(CacheConfig::default());
        let mut query = sample_query();
        query.hints.cache_strategy = crate::model::CacheStrategy::Bypass;

        cache.set(
            &query,
            QueryResult::empty(),
            SetOptions { priority: Priority::Normal, tags: Vec::new(), ttl: None },
        );
        assert!(cache.get(&query).is_none());
    }

    #[test]
    fn high_priority_survives_eviction_over_low_priority() {
        let cache = QueryCache::new(CacheConfig { max_bytes: 1, ..CacheConfig::default() });
        let low_query = sample_query();
        let mut high_query = sample_query();
        high_query.sources = vec!["billing".to_string()];

        cache.set(
            &low_query,
            QueryResult::empty(),
            SetOptions { priority: Priority::Low, tags: Vec::new(), ttl: None },
        );
        cache.set(
            &high_query,
            QueryResult::empty(),
            SetOptions { priority: Priority::Critical, tags: Vec::new(), ttl: None },
        );

        assert!(cache.get(&high_query).is_some());
    }

    #[test]
    fn expired_entry_is_dropped_on_access() {
        let cache = QueryCache::new(CacheConfig::default());
        let query = sample_query();
        cache.set(
            &query,
            QueryResult::empty(),
            SetOptions {
                priority: Priority::Normal,
                tags: Vec::new(),
                ttl: Some(Duration::from_millis(1)),
            },
        );
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get(&query).is_none());
    }
}
