//! Front door for queries: cache lookup, storage fan-out with retry, ML
//! insight annotation (spec.md §4.9).

mod service;

pub use service::{QueryService, QueryServiceConfig};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::cache::{CacheConfig, QueryCache};
    use crate::ml_hook::NoopMlHook;
    use crate::model::{CacheStrategy, Query, QueryHints, Severity, LogEntry, TimeRange};
    use crate::storage::{ColdAdapter, HotAdapter, StorageManager, StorageManagerConfig, WarmAdapter};

    async fn make_service() -> (QueryService, Arc<StorageManager>) {
        let storage = StorageManager::new(
            StorageManagerConfig::default(),
            Arc::new(HotAdapter::new()),
            Arc::new(WarmAdapter::new()),
            Arc::new(ColdAdapter::new()),
        );
        let cache = Arc::new(QueryCache::new(CacheConfig::default()));
        let service =
            QueryService::new(QueryServiceConfig::default(), Arc::clone(&storage), cache, Arc::new(NoopMlHook));
        (service, storage)
    }

    fn query_for(service: &str, strategy: CacheStrategy) -> Query {
        Query {
            time_range: TimeRange { from: 0, to: 1_000 },
            natural_language: None,
            filters: Vec::new(),
            levels: Vec::new(),
            sources: vec![service.to_string()],
            text_search: None,
            aggregations: Vec::new(),
            sort: None,
            limit: None,
            offset: None,
            hints: QueryHints { urgent: false, cache_strategy: strategy },
            ml_features: false,
        }
    }

    #[tokio::test]
    async fn rejects_inverted_time_range() {
        let (service, _storage) = make_service().await;
        let mut query = query_for("auth", CacheStrategy::Default);
        query.time_range = TimeRange { from: 100, to: 0 };
        assert!(service.query(query).await.is_err());
    }

    #[tokio::test]
    async fn rejects_time_range_beyond_clock_skew_slack() {
        let (service, _storage) = make_service().await;
        let mut query = query_for("auth", CacheStrategy::Default);
        let far_future = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos() as i64
            + Duration::from_secs(3600).as_nanos() as i64;
        query.time_range = TimeRange { from: 0, to: far_future };
        assert!(service.query(query).await.is_err());
    }

    #[tokio::test]
    async fn aggressive_strategy_caches_second_lookup() {
        let (service, storage) = make_service().await;
        storage.store(LogEntry::new("auth", Severity::Info, "login")).await.unwrap();

        let query = query_for("auth", CacheStrategy::Aggressive);
        let first = service.query(query.clone()).await.unwrap();
        assert!(!first.performance.cache_hit);

        let second = service.query(query).await.unwrap();
        assert!(second.performance.cache_hit);
    }

    #[tokio::test]
    async fn bypass_strategy_never_populates_cache() {
        let (service, storage) = make_service().await;
        storage.store(LogEntry::new("auth", Severity::Info, "login")).await.unwrap();

        let query = query_for("auth", CacheStrategy::Bypass);
        let first = service.query(query.clone()).await.unwrap();
        assert!(!first.performance.cache_hit);

        let second = service.query(query).await.unwrap();
        assert!(!second.performance.cache_hit);
    }
}
