//! Environment-driven configuration assembly (spec.md §6 "Environment
//! variables").
//!
//! Grounded on the teacher's `env::var(...).ok()` idiom
//! (`enterprise/mod.rs::EnterpriseRuntime::new`), generalized from a
//! single `RUSTYDB_ENV` lookup to every variable spec.md §6 enumerates,
//! and made stricter: a variable that's present but fails to parse is a
//! `Configuration` error, not a silently-ignored default.

use std::time::Duration;

use crate::cache::CacheConfig;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{HeimdallError, Result};
use crate::ingestion::IngestionConfig;
use crate::query::QueryServiceConfig;
use crate::resource_manager::ResourceManagerConfig;
use crate::storage::StorageManagerConfig;

/// Backend endpoints for the three storage tiers (spec.md §6).
#[derive(Debug, Clone, Default)]
pub struct StorageEndpoints {
    pub hot_url: Option<String>,
    pub warm_url: Option<String>,
    pub cold_bucket: Option<String>,
    pub cold_region: Option<String>,
}

/// Everything `Config::from_env` assembles, handed off to whatever wires
/// up the concrete adapters and starts the subsystems (spec.md §6).
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_endpoints: StorageEndpoints,
    pub storage: StorageManagerConfig,
    pub resources: ResourceManagerConfig,
    pub cache: CacheConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub ingestion: IngestionConfig,
    pub query_service: QueryServiceConfig,
}

impl Config {
    /// Reads every variable spec.md §6 enumerates, falling back to its
    /// documented default when unset. A variable that IS set but doesn't
    /// parse is a hard `Configuration` error rather than a silent
    /// fallback.
    pub fn from_env() -> Result<Self> {
        let storage_endpoints = StorageEndpoints {
            hot_url: env_opt_string("STORAGE_HOT_URL"),
            warm_url: env_opt_string("STORAGE_WARM_URL"),
            cold_bucket: env_opt_string("STORAGE_COLD_BUCKET"),
            cold_region: env_opt_string("STORAGE_COLD_REGION"),
        };

        let storage = StorageManagerConfig {
            hot_retention_days: env_u32("HOT_RETENTION_DAYS", 7)?,
            warm_retention_days: env_u32("WARM_RETENTION_DAYS", 30)?,
            migration_batch_size: env_usize("MIGRATION_BATCH_SIZE", 1000)?,
            migration_interval: Duration::from_secs(env_u64("MIGRATION_INTERVAL_HOURS", 6)? * 3600),
            ..StorageManagerConfig::default()
        };

        let resources = ResourceManagerConfig {
            max_memory_mb: env_u64("MAX_MEMORY_MB", 1024)?,
            max_connections: env_u64("MAX_CONNECTIONS", 100)?,
            max_concurrent_queries: env_u64("MAX_CONCURRENT_QUERIES", 50)?,
            max_cache_size_bytes: env_u64("CACHE_MAX_BYTES", 100 * 1024 * 1024)?,
            ..ResourceManagerConfig::default()
        };

        let cache = CacheConfig {
            max_bytes: env_u64("CACHE_MAX_BYTES", 100 * 1024 * 1024)?,
            default_ttl: Duration::from_millis(env_u64("CACHE_TTL_MS", 300_000)?),
            l1_ratio: env_f64("CACHE_L1_RATIO", 0.3)?,
            compression_threshold_bytes: env_u64("CACHE_COMPRESSION_THRESHOLD_BYTES", 1024 * 1024)?,
            ..CacheConfig::default()
        };

        let config = Self {
            storage_endpoints,
            storage,
            resources,
            cache,
            circuit_breaker: CircuitBreakerConfig::default(),
            ingestion: IngestionConfig::default(),
            query_service: QueryServiceConfig::default(),
        };

        config.storage.validate()?;
        config.resources.validate()?;
        config.cache.validate()?;
        config.circuit_breaker.validate()?;
        config.ingestion.validate()?;

        Ok(config)
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_u32(name: &str, default: u32) -> Result<u32> {
    parse_env(name, default)
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    parse_env(name, default)
}

fn env_usize(name: &str, default: usize) -> Result<usize> {
    parse_env(name, default)
}

fn env_f64(name: &str, default: f64) -> Result<f64> {
    parse_env(name, default)
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| {
            HeimdallError::Configuration(format!("{name}='{raw}' is not a valid value"))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    // `std::env::var` is process-global; serialize tests that touch it so
    // they don't race with each other under the default parallel test
    // runner.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_when_unset() {
        let _guard = ENV_LOCK.lock();
        std::env::remove_var("HOT_RETENTION_DAYS");
        let config = Config::from_env().unwrap();
        assert_eq!(config.storage.hot_retention_days, 7);
    }

    #[test]
    fn rejects_malformed_value() {
        let _guard = ENV_LOCK.lock();
        std::env::set_var("HOT_RETENTION_DAYS", "not-a-number");
        let result = Config::from_env();
        std::env::remove_var("HOT_RETENTION_DAYS");
        assert!(result.is_err());
    }
}
