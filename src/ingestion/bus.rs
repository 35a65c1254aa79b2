use async_trait::async_trait;

use crate::error::Result;
use crate::model::LogEntry;

/// The message bus adapter fan-out target (spec.md §4.7 "(b) the message
/// bus adapter, if configured"). Grounded on the shape of the teacher's
/// `EventPublisher` (`streams/publisher.rs`) — publish a batch, get an
/// outcome back — collapsed to the one operation the pipeline needs; topic
/// management, partitioning, and serialization format selection are a
/// concrete adapter's concern, not this trait's.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish_batch(&self, entries: &[LogEntry]) -> Result<()>;
}

/// Entries matched against live subscriptions and delivered to their
/// callbacks (spec.md §4.7 "(c) the Subscription Manager for dispatch").
/// Kept as a trait here, implemented by `subscription::SubscriptionManager`,
/// so the pipeline doesn't depend on that module's internals.
#[async_trait]
pub trait EntryDispatcher: Send + Sync {
    async fn dispatch(&self, entries: &[LogEntry]);
}
