//! Live subscription registry: match ingested entries against registered
//! queries and deliver at-least-once, per-subscription (spec.md §4.8).

mod manager;

pub use manager::{
    DeliverHistorical, OnOverflow, SubscriptionCallback, SubscriptionManager, SubscriptionOptions,
    SubscriptionStatus,
};

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::ingestion::EntryDispatcher;
    use crate::model::{LogEntry, QueryHints, Severity, TimeRange};
    use crate::storage::{ColdAdapter, HotAdapter, StorageManager, StorageManagerConfig, WarmAdapter};

    fn make_storage() -> Arc<StorageManager> {
        StorageManager::new(
            StorageManagerConfig::default(),
            Arc::new(HotAdapter::new()),
            Arc::new(WarmAdapter::new()),
            Arc::new(ColdAdapter::new()),
        )
    }

    fn unbounded_query(sources: Vec<&str>) -> crate::model::Query {
        crate::model::Query {
            time_range: TimeRange { from: i64::MIN, to: i64::MAX },
            natural_language: None,
            filters: Vec::new(),
            levels: Vec::new(),
            sources: sources.into_iter().map(String::from).collect(),
            text_search: None,
            aggregations: Vec::new(),
            sort: None,
            limit: None,
            offset: None,
            hints: QueryHints::default(),
            ml_features: false,
        }
    }

    struct CountingCallback {
        delivered: AtomicUsize,
    }

    #[async_trait]
    impl SubscriptionCallback for CountingCallback {
        async fn deliver(&self, _entry: LogEntry) {
            self.delivered.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn dispatch_delivers_only_to_matching_subscriptions() {
        let manager = SubscriptionManager::new(Duration::from_secs(3600));
        let storage = make_storage();
        let auth_cb = Arc::new(CountingCallback { delivered: AtomicUsize::new(0) });
        let billing_cb = Arc::new(CountingCallback { delivered: AtomicUsize::new(0) });

        manager
            .subscribe(&storage, unbounded_query(vec!["auth"]), SubscriptionOptions::default(), auth_cb.clone())
            .await
            .unwrap();
        manager
            .subscribe(
                &storage,
                unbounded_query(vec!["billing"]),
                SubscriptionOptions::default(),
                billing_cb.clone(),
            )
            .await
            .unwrap();

        let entry = LogEntry::new("auth", Severity::Info, "login");
        manager.dispatch(&[entry]).await;

        // Worker tasks run concurrently; give them a moment to drain.
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(auth_cb.delivered.load(Ordering::SeqCst), 1);
        assert_eq!(billing_cb.delivered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsubscribe_removes_from_registry() {
        let manager = SubscriptionManager::new(Duration::from_secs(3600));
        let storage = make_storage();
        let cb = Arc::new(CountingCallback { delivered: AtomicUsize::new(0) });
        let id = manager
            .subscribe(&storage, unbounded_query(vec!["auth"]), SubscriptionOptions::default(), cb)
            .await
            .unwrap();

        assert_eq!(manager.active_count(), 1);
        manager.unsubscribe(id).unwrap();
        assert_eq!(manager.active_count(), 0);
        assert!(manager.unsubscribe(id).is_err());
    }

    #[tokio::test]
    async fn idle_subscription_is_reaped() {
        let manager = SubscriptionManager::new(Duration::from_millis(10));
        let storage = make_storage();
        let cb = Arc::new(CountingCallback { delivered: AtomicUsize::new(0) });
        manager
            .subscribe(&storage, unbounded_query(vec!["auth"]), SubscriptionOptions::default(), cb)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.reap_idle();
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn drop_oldest_overflow_keeps_buffer_bounded() {
        let manager = SubscriptionManager::new(Duration::from_secs(3600));
        let storage = make_storage();
        let cb = Arc::new(CountingCallback { delivered: AtomicUsize::new(0) });
        // A buffer of 1 with a callback that never gets scheduled fast
        // enough still bounds the queue rather than growing unboundedly.
        manager
            .subscribe(
                &storage,
                unbounded_query(vec!["auth"]),
                SubscriptionOptions { buffer_size: 1, on_overflow: OnOverflow::DropOldest, ..Default::default() },
                cb.clone(),
            )
            .await
            .unwrap();

        let entries: Vec<LogEntry> =
            (0..50).map(|_| LogEntry::new("auth", Severity::Info, "x")).collect();
        manager.dispatch(&entries).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cb.delivered.load(Ordering::SeqCst) <= 50);
    }

    #[tokio::test]
    async fn from_time_range_replays_matching_history_before_live_delivery() {
        let manager = SubscriptionManager::new(Duration::from_secs(3600));
        let storage = make_storage();
        let mut past = LogEntry::new("auth", Severity::Info, "already ingested");
        past.timestamp = 1_000;
        storage.store(past).await.unwrap();

        let cb = Arc::new(CountingCallback { delivered: AtomicUsize::new(0) });
        manager
            .subscribe(
                &storage,
                unbounded_query(vec!["auth"]),
                SubscriptionOptions { deliver_historical: DeliverHistorical::FromTimeRange, ..Default::default() },
                cb.clone(),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cb.delivered.load(Ordering::SeqCst), 1);

        let live = LogEntry::new("auth", Severity::Info, "live");
        manager.dispatch(&[live]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cb.delivered.load(Ordering::SeqCst), 2);
    }
}
