use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::{HeimdallError, Result};
use crate::ml_hook::MlHook;
use crate::model::LogEntry;
use crate::storage::StorageManager;

use super::bus::{EntryDispatcher, MessageBus};
use super::validate::{enrich, validate};

/// spec.md §6 env vars: none named directly for ingestion beyond the
/// storage/cache/pool ones; these defaults follow the teacher's
/// `PublisherConfig` batching shape (`streams/publisher.rs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Backpressure ceiling: entries validated-and-buffered but not yet
    /// flushed (spec.md §4.7 "blocking the producer until buffer drains").
    pub max_buffered: usize,
    pub dead_letter_capacity: usize,
    pub dead_letter_retry_interval: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            flush_interval: Duration::from_secs(1),
            max_buffered: 50_000,
            dead_letter_capacity: 10_000,
            dead_letter_retry_interval: Duration::from_secs(30),
        }
    }
}

impl IngestionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.max_buffered == 0 {
            return Err(HeimdallError::Configuration(
                "batch_size and max_buffered must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryError {
    pub index: usize,
    pub reason: String,
}

/// `{accepted, failed, errors}` (spec.md §6 Ingestion API). `accepted`
/// counts entries that passed validation and were buffered for flush, not
/// entries confirmed durable — durability follows within
/// `flush_interval + hot_write_latency` per testable property 1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub accepted: usize,
    pub failed: usize,
    pub errors: Vec<EntryError>,
}

/// Validate → enrich → batch → fan out, with blocking backpressure on
/// overflow (spec.md §4.7).
///
/// Grounded on the teacher's `EventPublisher` (`streams/publisher.rs`): the
/// same backpressure-semaphore-plus-batch-buffer shape, generalized from
/// topic/partition publish bookkeeping to the spec's
/// validate-enrich-batch-fanout pipeline, and from a single publish target
/// to three concurrent fan-out destinations each behind its own circuit
/// breaker.
pub struct IngestionPipeline {
    config: IngestionConfig,
    storage: Arc<StorageManager>,
    bus: Option<Arc<dyn MessageBus>>,
    dispatcher: Option<Arc<dyn EntryDispatcher>>,
    ml_hook: Arc<dyn MlHook>,
    buffer: Mutex<Vec<LogEntry>>,
    backpressure: Arc<Semaphore>,
    storage_breaker: Arc<CircuitBreaker>,
    bus_breaker: Arc<CircuitBreaker>,
    dead_letters: Mutex<VecDeque<LogEntry>>,
    logs_ingested: AtomicU64,
    logs_failed: AtomicU64,
}

/// Cumulative counters for `metrics()` (spec.md §6 "counters").
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestionCounters {
    pub logs_ingested: u64,
    pub logs_failed: u64,
}

impl IngestionPipeline {
    pub fn new(
        config: IngestionConfig,
        storage: Arc<StorageManager>,
        bus: Option<Arc<dyn MessageBus>>,
        dispatcher: Option<Arc<dyn EntryDispatcher>>,
        ml_hook: Arc<dyn MlHook>,
    ) -> Arc<Self> {
        let backpressure = Arc::new(Semaphore::new(config.max_buffered));
        Arc::new(Self {
            storage_breaker: CircuitBreaker::new(
                "ingestion.storage".to_string(),
                CircuitBreakerConfig::default(),
            ),
            bus_breaker: CircuitBreaker::new(
                "ingestion.bus".to_string(),
                CircuitBreakerConfig::default(),
            ),
            config,
            storage,
            bus,
            dispatcher,
            ml_hook,
            buffer: Mutex::new(Vec::new()),
            backpressure,
            dead_letters: Mutex::new(VecDeque::new()),
            logs_ingested: AtomicU64::new(0),
            logs_failed: AtomicU64::new(0),
        })
    }

    /// `(breaker name, state)` for the storage and bus breakers, for the
    /// health endpoint's `circuits` component (spec.md §6).
    pub fn breaker_states(&self) -> Vec<(String, crate::circuit_breaker::CircuitState)> {
        vec![
            (self.storage_breaker.name().to_string(), self.storage_breaker.state()),
            (self.bus_breaker.name().to_string(), self.bus_breaker.state()),
        ]
    }

    pub fn counters(&self) -> IngestionCounters {
        IngestionCounters {
            logs_ingested: self.logs_ingested.load(Ordering::Relaxed),
            logs_failed: self.logs_failed.load(Ordering::Relaxed),
        }
    }

    /// Single-entry ingest; surfaces validation failures as an error
    /// rather than a `BatchResult` (spec.md §6).
    pub async fn ingest(&self, entry: LogEntry) -> Result<()> {
        let result = self.ingest_batch(vec![entry]).await;
        if let Some(err) = result.errors.into_iter().next() {
            return Err(HeimdallError::Validation(err.reason));
        }
        Ok(())
    }

    /// Validates and enriches each entry, buffering the ones that pass.
    /// Blocks (backpressure) when the buffer is at `max_buffered` rather
    /// than dropping; flushes immediately once `batch_size` is reached.
    pub async fn ingest_batch(&self, entries: Vec<LogEntry>) -> BatchResult {
        let mut result = BatchResult::default();

        for (index, mut entry) in entries.into_iter().enumerate() {
            if let Err(e) = validate(&entry) {
                result.failed += 1;
                self.logs_failed.fetch_add(1, Ordering::Relaxed);
                result.errors.push(EntryError { index, reason: e.to_string() });
                continue;
            }
            enrich(&mut entry, self.ml_hook.as_ref()).await;

            let permit = match Arc::clone(&self.backpressure).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    result.failed += 1;
                    self.logs_failed.fetch_add(1, Ordering::Relaxed);
                    result.errors.push(EntryError {
                        index,
                        reason: "ingestion pipeline is shutting down".to_string(),
                    });
                    continue;
                }
            };
            // Permit is released explicitly by `flush` when the entry
            // leaves the buffer, not on drop.
            permit.forget();

            let should_flush = {
                let mut buffer = self.buffer.lock();
                buffer.push(entry);
                buffer.len() >= self.config.batch_size
            };
            result.accepted += 1;
            self.logs_ingested.fetch_add(1, Ordering::Relaxed);

            if should_flush {
                self.flush().await;
            }
        }

        result
    }

    /// Drains the buffer and fans it out; a no-op if nothing is buffered.
    pub async fn flush(&self) {
        let batch = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                return;
            }
            std::mem::take(&mut *buffer)
        };
        self.flush_batch(batch).await;
    }

    /// Fans a drained batch out to storage, the bus, and the subscription
    /// dispatcher concurrently (spec.md §4.7 "Fan-out"). A bus failure is
    /// queued to the dead-letter buffer rather than failing the batch.
    async fn flush_batch(&self, batch: Vec<LogEntry>) {
        let n = batch.len();
        self.backpressure.add_permits(n);

        let storage = Arc::clone(&self.storage);
        let storage_entries = batch.clone();
        let storage_breaker = Arc::clone(&self.storage_breaker);
        let storage_task = tokio::spawn(async move {
            storage_breaker.call(|| async move { storage.store_batch(storage_entries).await }).await
        });

        let dispatch_task = self.dispatcher.clone().map(|dispatcher| {
            let entries = batch.clone();
            tokio::spawn(async move {
                dispatcher.dispatch(&entries).await;
            })
        });

        if let Some(bus) = &self.bus {
            let outcome = self.bus_breaker.call(|| async { bus.publish_batch(&batch).await }).await;
            if let Err(e) = outcome {
                tracing::warn!(
                    error = %e,
                    batch_size = n,
                    "bus publish failed, batch is partial_success; queuing for dead-letter retry"
                );
                self.enqueue_dead_letters(batch);
            }
        }

        match storage_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, batch_size = n, "hot-tier store_batch failed")
            }
            Err(e) => tracing::error!(error = %e, "storage flush task panicked"),
        }
        if let Some(handle) = dispatch_task {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "subscription dispatch task panicked");
            }
        }
    }

    fn enqueue_dead_letters(&self, entries: Vec<LogEntry>) {
        let mut dlq = self.dead_letters.lock();
        for entry in entries {
            if dlq.len() >= self.config.dead_letter_capacity {
                if let Some(dropped) = dlq.pop_front() {
                    tracing::error!(
                        entry_id = %dropped.id,
                        "dead-letter queue at capacity, dropping oldest bus-failed entry"
                    );
                }
            }
            dlq.push_back(entry);
        }
    }

    pub fn dead_letter_len(&self) -> usize {
        self.dead_letters.lock().len()
    }

    /// Retries one dead-letter chunk against the bus; entries that fail
    /// again are requeued at the front so ordering among retries is
    /// preserved.
    async fn retry_dead_letters(&self) {
        let Some(bus) = &self.bus else { return };
        let chunk: Vec<LogEntry> = {
            let mut dlq = self.dead_letters.lock();
            let n = dlq.len().min(self.config.batch_size);
            dlq.drain(..n).collect()
        };
        if chunk.is_empty() {
            return;
        }
        match self.bus_breaker.call(|| async { bus.publish_batch(&chunk).await }).await {
            Ok(()) => tracing::info!(count = chunk.len(), "dead-letter retry succeeded"),
            Err(e) => {
                tracing::warn!(error = %e, count = chunk.len(), "dead-letter retry failed, requeuing");
                let mut dlq = self.dead_letters.lock();
                for entry in chunk.into_iter().rev() {
                    dlq.push_front(entry);
                }
            }
        }
    }

    /// Spawns the periodic time-triggered flush (spec.md §4.7 "up to
    /// `batch_size` or `flush_interval`, whichever first").
    pub fn spawn_flusher(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.config.flush_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.flush().await;
            }
        })
    }

    /// Spawns the periodic dead-letter retry sweep.
    pub fn spawn_dead_letter_retry(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.config.dead_letter_retry_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.retry_dead_letters().await;
            }
        })
    }

    pub async fn close(&self) -> Result<()> {
        self.flush().await;
        self.storage.close().await
    }
}
