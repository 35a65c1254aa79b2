use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{QueryCache, SetOptions};
use crate::error::{HeimdallError, Result};
use crate::ml_hook::MlHook;
use crate::model::{CacheStrategy, Priority, Query, QueryResult};
use crate::storage::StorageManager;

/// spec.md §6 env vars: none named directly; `retry_max_attempts` and
/// `retry_initial_backoff` follow §4.9 step 3's "max 2 attempts, 500 ms
/// initial backoff" literally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryServiceConfig {
    /// How far into the future `time_range.to` may be before it's
    /// rejected, to tolerate clock skew between producer and query caller
    /// (spec.md §4.9 step 1).
    pub clock_skew_slack: Duration,
    pub retry_max_attempts: u32,
    pub retry_initial_backoff: Duration,
}

impl Default for QueryServiceConfig {
    fn default() -> Self {
        Self {
            clock_skew_slack: Duration::from_secs(5),
            retry_max_attempts: 2,
            retry_initial_backoff: Duration::from_millis(500),
        }
    }
}

/// Front door for queries (spec.md §4.9): validates the time range, is
/// cache-strategy-aware, retries the Storage Manager fan-out on transient
/// failure, and appends ML insights when requested.
///
/// Grounded on spec.md §4.9's four numbered steps directly — no teacher
/// file plays this exact "cache-then-storage-then-annotate" front-door
/// role, so the shape here follows the spec's own control flow, wired to
/// the already-built [`StorageManager`] and [`QueryCache`].
pub struct QueryService {
    config: QueryServiceConfig,
    storage: Arc<StorageManager>,
    cache: Arc<QueryCache>,
    ml_hook: Arc<dyn MlHook>,
    queries_executed: AtomicU64,
}

impl QueryService {
    pub fn new(
        config: QueryServiceConfig,
        storage: Arc<StorageManager>,
        cache: Arc<QueryCache>,
        ml_hook: Arc<dyn MlHook>,
    ) -> Self {
        Self { config, storage, cache, ml_hook, queries_executed: AtomicU64::new(0) }
    }

    pub fn queries_executed(&self) -> u64 {
        self.queries_executed.load(Ordering::Relaxed)
    }

    pub async fn query(&self, query: Query) -> Result<QueryResult> {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
        self.validate_time_range(&query)?;

        let strategy = query.hints.cache_strategy;
        if strategy != CacheStrategy::Bypass {
            if let Some(mut cached) = self.cache.get(&query) {
                cached.performance.cache_hit = true;
                return Ok(cached);
            }
        }

        let mut result = self.query_storage_with_retry(&query).await?;
        result.performance.cache_hit = false;

        if query.ml_features && !result.logs.is_empty() {
            match self.ml_hook.annotate(&result).await {
                Ok(insights) => result.insights = insights,
                Err(e) => tracing::warn!(error = %e, "ML insight annotation failed"),
            }
        }

        if strategy != CacheStrategy::Bypass {
            let ttl = match strategy {
                CacheStrategy::Aggressive => Duration::from_secs(10 * 60),
                CacheStrategy::Default => self.data_age_ttl(&query),
                CacheStrategy::Bypass => unreachable!("handled above"),
            };
            self.cache.set(
                &query,
                result.clone(),
                SetOptions { priority: Priority::Normal, tags: query.derived_tags(), ttl: Some(ttl) },
            );
        }

        Ok(result)
    }

    fn validate_time_range(&self, query: &Query) -> Result<()> {
        if !query.time_range.is_valid() {
            return Err(HeimdallError::Validation(
                "time_range.from must be <= time_range.to".to_string(),
            ));
        }
        let slack_ns = self.config.clock_skew_slack.as_nanos() as i64;
        if query.time_range.to > now_ns() + slack_ns {
            return Err(HeimdallError::Validation(
                "time_range.to is further in the future than the clock-skew slack allows".to_string(),
            ));
        }
        Ok(())
    }

    /// 60 s for ranges ending within the last hour, 5 min otherwise
    /// (spec.md §4.9 step 2, `default` strategy).
    fn data_age_ttl(&self, query: &Query) -> Duration {
        const ONE_HOUR_NS: i64 = 3600 * 1_000_000_000;
        if now_ns() - query.time_range.to <= ONE_HOUR_NS {
            Duration::from_secs(60)
        } else {
            Duration::from_secs(5 * 60)
        }
    }

    /// Retries only transient storage errors, up to `retry_max_attempts`
    /// total attempts with exponentially doubling backoff starting at
    /// `retry_initial_backoff` (spec.md §4.9 step 3; §7 propagation
    /// policy: validation/circuit-open/overloaded errors are never
    /// retried here).
    async fn query_storage_with_retry(&self, query: &Query) -> Result<QueryResult> {
        let mut attempt = 0u32;
        let mut backoff = self.config.retry_initial_backoff;
        loop {
            match self.storage.query(query).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempt + 1 < self.config.retry_max_attempts => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "storage query failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn now_ns() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}
