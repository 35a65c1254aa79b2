//! Validate → enrich → batch → fan out, with backpressure (spec.md §4.7).

mod bus;
mod pipeline;
mod validate;

pub use bus::{EntryDispatcher, MessageBus};
pub use pipeline::{BatchResult, EntryError, IngestionConfig, IngestionCounters, IngestionPipeline};

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::Result;
    use crate::model::{LogEntry, Severity};
    use crate::storage::{ColdAdapter, HotAdapter, StorageManager, StorageManagerConfig, WarmAdapter};

    fn make_pipeline(
        bus: Option<Arc<dyn MessageBus>>,
        dispatcher: Option<Arc<dyn EntryDispatcher>>,
    ) -> Arc<IngestionPipeline> {
        let storage = StorageManager::new(
            StorageManagerConfig::default(),
            Arc::new(HotAdapter::new()),
            Arc::new(WarmAdapter::new()),
            Arc::new(ColdAdapter::new()),
        );
        IngestionPipeline::new(
            IngestionConfig { batch_size: 2, ..IngestionConfig::default() },
            storage,
            bus,
            dispatcher,
            Arc::new(crate::ml_hook::NoopMlHook),
        )
    }

    struct CountingBus {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MessageBus for CountingBus {
        async fn publish_batch(&self, _entries: &[LogEntry]) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(crate::error::HeimdallError::StorageUnavailable("bus down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct CountingDispatcher {
        dispatched: AtomicUsize,
    }

    #[async_trait]
    impl EntryDispatcher for CountingDispatcher {
        async fn dispatch(&self, entries: &[LogEntry]) {
            self.dispatched.fetch_add(entries.len(), Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn accepts_valid_entries_and_rejects_invalid_ones() {
        let pipeline = make_pipeline(None, None);
        let mut bad = LogEntry::new("auth", Severity::Info, "hi");
        bad.source.service = String::new();
        let good = LogEntry::new("auth", Severity::Info, "user login");

        let result = pipeline.ingest_batch(vec![good, bad]).await;
        assert_eq!(result.accepted, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors[0].index, 1);
    }

    #[tokio::test]
    async fn flush_at_batch_size_reaches_storage_and_dispatcher() {
        let dispatcher = Arc::new(CountingDispatcher { dispatched: AtomicUsize::new(0) });
        let pipeline = make_pipeline(None, Some(dispatcher.clone()));

        let e1 = LogEntry::new("auth", Severity::Info, "login");
        let e2 = LogEntry::new("auth", Severity::Info, "logout");
        let result = pipeline.ingest_batch(vec![e1, e2]).await;
        assert_eq!(result.accepted, 2);

        assert_eq!(dispatcher.dispatched.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn bus_failure_queues_dead_letter_without_failing_batch() {
        let bus = Arc::new(CountingBus { calls: AtomicUsize::new(0), fail: true });
        let pipeline = make_pipeline(Some(bus.clone()), None);

        let e1 = LogEntry::new("auth", Severity::Info, "login");
        let e2 = LogEntry::new("auth", Severity::Info, "logout");
        let result = pipeline.ingest_batch(vec![e1, e2]).await;

        assert_eq!(result.accepted, 2);
        assert_eq!(bus.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.dead_letter_len(), 2);
    }

    #[tokio::test]
    async fn time_triggered_flush_drains_sub_batch_buffer() {
        let storage = StorageManager::new(
            StorageManagerConfig::default(),
            Arc::new(HotAdapter::new()),
            Arc::new(WarmAdapter::new()),
            Arc::new(ColdAdapter::new()),
        );
        let pipeline = IngestionPipeline::new(
            IngestionConfig {
                batch_size: 100,
                flush_interval: Duration::from_millis(20),
                ..IngestionConfig::default()
            },
            storage,
            None,
            None,
            Arc::new(crate::ml_hook::NoopMlHook),
        );
        let _handle = pipeline.clone().spawn_flusher();

        let entry = LogEntry::new("auth", Severity::Info, "login");
        let result = pipeline.ingest_batch(vec![entry]).await;
        assert_eq!(result.accepted, 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        // The periodic flusher should have drained the single buffered
        // entry well under batch_size.
    }
}
