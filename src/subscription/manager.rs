use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::{HeimdallError, Result};
use crate::ingestion::EntryDispatcher;
use crate::model::{LogEntry, Query};
use crate::storage::{matches_query, StorageManager};

/// Per-subscription delivery target (spec.md §6 "subscribe(query, options,
/// callback)").
#[async_trait]
pub trait SubscriptionCallback: Send + Sync {
    async fn deliver(&self, entry: LogEntry);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverHistorical {
    None,
    FromTimeRange,
}

/// What happens when a subscriber's own buffer is full (spec.md §6
/// `on_overflow ∈ {block, drop_oldest}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnOverflow {
    Block,
    DropOldest,
}

#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    pub deliver_historical: DeliverHistorical,
    pub buffer_size: usize,
    pub on_overflow: OnOverflow,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            deliver_historical: DeliverHistorical::None,
            buffer_size: 256,
            on_overflow: OnOverflow::Block,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

/// Grounded on the teacher's `EventSubscriber` (`streams/subscriber.rs`):
/// same buffer-plus-worker-task shape, generalized from topic/partition
/// polling to matching ingested `LogEntry`s against a `Query`, and from a
/// single global dead-letter queue to a per-subscription bounded buffer
/// whose overflow policy (block vs. drop-oldest) is caller-selectable.
struct Subscription {
    query: Query,
    options: SubscriptionOptions,
    callback: Arc<dyn SubscriptionCallback>,
    queue: Mutex<VecDeque<LogEntry>>,
    notify_consumer: Notify,
    notify_producer: Notify,
    status: Mutex<SubscriptionStatus>,
    last_activity: Mutex<Instant>,
    cancelled: AtomicBool,
}

impl Subscription {
    /// Blocks only the caller pushing to *this* subscription (spec.md
    /// §4.8 "a slow consumer applies backpressure to only its own
    /// stream").
    async fn push(&self, entry: LogEntry) {
        match self.options.on_overflow {
            OnOverflow::DropOldest => {
                let mut queue = self.queue.lock();
                if queue.len() >= self.options.buffer_size {
                    queue.pop_front();
                }
                queue.push_back(entry);
                drop(queue);
                self.notify_consumer.notify_one();
            }
            OnOverflow::Block => {
                let mut entry = Some(entry);
                loop {
                    {
                        let mut queue = self.queue.lock();
                        if queue.len() < self.options.buffer_size {
                            queue.push_back(entry.take().unwrap());
                            drop(queue);
                            self.notify_consumer.notify_one();
                            return;
                        }
                    }
                    self.notify_producer.notified().await;
                }
            }
        }
    }
}

/// Live subscription registry and matcher (spec.md §4.8).
pub struct SubscriptionManager {
    subscriptions: RwLock<HashMap<Uuid, Arc<Subscription>>>,
    max_idle: Duration,
}

impl SubscriptionManager {
    pub fn new(max_idle: Duration) -> Arc<Self> {
        Arc::new(Self { subscriptions: RwLock::new(HashMap::new()), max_idle })
    }

    /// Registers a subscription, replays matching history if requested
    /// (spec.md §4.8 `deliver_historical: from_time_range` — the query's
    /// own `time_range` is reused as the replay window), and spawns the
    /// subscription's single-threaded delivery worker (spec.md §4.8
    /// "per-subscription, single-threaded, at-least-once").
    pub async fn subscribe(
        &self,
        storage: &StorageManager,
        query: Query,
        options: SubscriptionOptions,
        callback: Arc<dyn SubscriptionCallback>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let deliver_historical = options.deliver_historical;
        let replay_query = query.clone();
        let subscription = Arc::new(Subscription {
            query,
            options,
            callback,
            queue: Mutex::new(VecDeque::new()),
            notify_consumer: Notify::new(),
            notify_producer: Notify::new(),
            status: Mutex::new(SubscriptionStatus::Active),
            last_activity: Mutex::new(Instant::now()),
            cancelled: AtomicBool::new(false),
        });
        self.subscriptions.write().insert(id, Arc::clone(&subscription));

        if deliver_historical == DeliverHistorical::FromTimeRange {
            let historical = storage.query(&replay_query).await?;
            for entry in historical.logs {
                subscription.push(entry).await;
            }
            *subscription.last_activity.lock() = Instant::now();
        }

        tokio::spawn(run_worker(subscription));
        Ok(id)
    }

    /// Cancels a subscription by its owner (spec.md §4.8).
    pub fn unsubscribe(&self, id: Uuid) -> Result<()> {
        let subscription = self
            .subscriptions
            .write()
            .remove(&id)
            .ok_or_else(|| HeimdallError::NotFound(format!("subscription '{id}' not found")))?;
        *subscription.status.lock() = SubscriptionStatus::Cancelled;
        subscription.cancelled.store(true, Ordering::SeqCst);
        subscription.notify_consumer.notify_one();
        Ok(())
    }

    pub fn status(&self, id: Uuid) -> Option<SubscriptionStatus> {
        self.subscriptions.read().get(&id).map(|s| *s.status.lock())
    }

    pub fn active_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Auto-expires subscriptions idle longer than `max_idle` (spec.md
    /// §4.8 "auto-expired after `max_idle`").
    pub fn reap_idle(&self) {
        let now = Instant::now();
        let expired: Vec<Uuid> = self
            .subscriptions
            .read()
            .iter()
            .filter(|(_, sub)| now.duration_since(*sub.last_activity.lock()) > self.max_idle)
            .map(|(id, _)| *id)
            .collect();

        let mut subs = self.subscriptions.write();
        for id in expired {
            if let Some(subscription) = subs.remove(&id) {
                *subscription.status.lock() = SubscriptionStatus::Expired;
                subscription.cancelled.store(true, Ordering::SeqCst);
                subscription.notify_consumer.notify_one();
            }
        }
    }

    pub fn spawn_idle_reaper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.reap_idle();
            }
        })
    }
}

async fn run_worker(subscription: Arc<Subscription>) {
    loop {
        let next = { subscription.queue.lock().pop_front() };
        match next {
            Some(entry) => {
                subscription.callback.deliver(entry).await;
                subscription.notify_producer.notify_one();
            }
            None => {
                if subscription.cancelled.load(Ordering::SeqCst) {
                    return;
                }
                subscription.notify_consumer.notified().await;
            }
        }
    }
}

/// Match semantics (spec.md §4.8): time range, levels, sources, and
/// structured predicates, reusing the same predicate evaluation the
/// storage adapters use for in-memory filtering.
#[async_trait]
impl EntryDispatcher for SubscriptionManager {
    async fn dispatch(&self, entries: &[LogEntry]) {
        let subs: Vec<Arc<Subscription>> = self.subscriptions.read().values().cloned().collect();
        if subs.is_empty() {
            return;
        }
        for entry in entries {
            let pushes = subs.iter().filter(|sub| matches_query(entry, &sub.query)).map(|sub| {
                *sub.last_activity.lock() = Instant::now();
                sub.push(entry.clone())
            });
            futures::future::join_all(pushes).await;
        }
    }
}
