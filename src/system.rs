//! Wires the independently-testable modules into one running instance:
//! storage tiers, cache, ingestion, subscriptions, query service, and
//! resource accounting, plus the background tasks each owns.
//!
//! Grounded on the teacher's `EnterpriseRuntime` (`enterprise/mod.rs`): a
//! single struct built from a `Config`, constructing its subsystems in
//! dependency order and handing back something the transport layer can be
//! built on top of.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::AppState;
use crate::cache::QueryCache;
use crate::config::Config;
use crate::ingestion::IngestionPipeline;
use crate::ml_hook::{MlHook, NoopMlHook};
use crate::query::QueryService;
use crate::resource_manager::ResourceManager;
use crate::storage::{ColdAdapter, HotAdapter, StorageManager, WarmAdapter};
use crate::subscription::SubscriptionManager;

/// One wired-up instance of the whole system, owning every subsystem and
/// the background tasks it spawned. Dropping this without calling
/// [`Heimdall::shutdown`] leaves those tasks running detached, same as the
/// teacher's `EnterpriseRuntime` leaves its background threads running
/// until its own `shutdown()` is called.
pub struct Heimdall {
    pub storage: Arc<StorageManager>,
    pub cache: Arc<QueryCache>,
    pub ingestion: Arc<IngestionPipeline>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub query_service: Arc<QueryService>,
    pub resources: Arc<ResourceManager>,
    ml_hook: Arc<dyn MlHook>,
    background: Vec<tokio::task::JoinHandle<()>>,
}

/// Idle subscriptions older than this are reaped (spec.md §4.8); not named
/// as a distinct env var, so it follows the same default as the
/// `dead_letter_retry_interval`-adjacent durations elsewhere in the
/// pipeline rather than inventing a new knob.
const SUBSCRIPTION_MAX_IDLE: Duration = Duration::from_secs(3600);
const IDLE_REAP_INTERVAL: Duration = Duration::from_secs(60);
/// How often the cache's resident-byte count is sampled into the resource
/// manager's `cache_bytes` counter, matching the default
/// `pressure_check_interval` (spec.md §4.2 "every ~10s").
const CACHE_SAMPLE_INTERVAL: Duration = Duration::from_secs(10);

impl Heimdall {
    /// Constructs every subsystem from `config` and spawns their
    /// background tasks. The storage tiers are the in-memory adapters;
    /// swapping in real backends (per `config.storage_endpoints`) is a
    /// matter of constructing different `Arc<dyn StorageAdapter>` values
    /// here once concrete backends exist.
    pub fn new(config: Config) -> Arc<Self> {
        let storage = StorageManager::new(
            config.storage,
            Arc::new(HotAdapter::new()),
            Arc::new(WarmAdapter::new()),
            Arc::new(ColdAdapter::new()),
        );

        let cache = Arc::new(QueryCache::new(config.cache));

        let ml_hook: Arc<dyn MlHook> = Arc::new(NoopMlHook);

        let subscriptions = SubscriptionManager::new(SUBSCRIPTION_MAX_IDLE);

        let ingestion = IngestionPipeline::new(
            config.ingestion,
            storage.clone(),
            None,
            Some(subscriptions.clone()),
            ml_hook.clone(),
        );

        let query_service = Arc::new(QueryService::new(
            config.query_service,
            storage.clone(),
            cache.clone(),
            ml_hook.clone(),
        ));

        let resources = Arc::new(ResourceManager::new(config.resources));
        resources.register_pressure_listener(cache.clone());

        let mut background = Vec::new();
        background.push(ingestion.clone().spawn_flusher());
        background.push(ingestion.clone().spawn_dead_letter_retry());
        background.push(subscriptions.clone().spawn_idle_reaper(IDLE_REAP_INTERVAL));
        background.push(storage.clone().spawn_migrator());
        background.push(cache.clone().spawn_cleanup_task());
        background.push(resources.clone().spawn_monitor());
        background.push(spawn_cache_byte_sampler(cache.clone(), resources.clone(), CACHE_SAMPLE_INTERVAL));

        Arc::new(Self {
            storage,
            cache,
            ingestion,
            subscriptions,
            query_service,
            resources,
            ml_hook,
            background,
        })
    }

    /// An [`AppState`] ready to hand to [`crate::api::ApiServer::new`].
    pub fn app_state(&self) -> AppState {
        AppState {
            ingestion: self.ingestion.clone(),
            query_service: self.query_service.clone(),
            subscriptions: self.subscriptions.clone(),
            storage: self.storage.clone(),
            cache: self.cache.clone(),
            resources: self.resources.clone(),
            ml_hook: self.ml_hook.clone(),
            started_at: Arc::new(Instant::now()),
        }
    }

    /// Aborts every background task this instance spawned.
    pub fn shutdown(&self) {
        for handle in &self.background {
            handle.abort();
        }
    }
}

/// Keeps `ResourceManager`'s `cache_bytes` counter in sync with the cache's
/// actual resident size, since the cache tracks its own byte accounting
/// internally rather than reporting every `set`/eviction through the
/// resource manager directly.
fn spawn_cache_byte_sampler(
    cache: Arc<QueryCache>,
    resources: Arc<ResourceManager>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_bytes = 0i64;
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let current = cache.stats().total_bytes as i64;
            resources.record_cache_delta(current - last_bytes);
            last_bytes = current;
        }
    })
}
