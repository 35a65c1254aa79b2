//! Connection pool with priority-queued acquisition and tag indexing
//! (spec.md §4.1).
//!
//! Grounded on `networking/pool/manager.rs` and `node_pool.rs` in the
//! teacher repo, generalized from a node-to-node multiplexed-stream pool
//! to a generic `Pool<F: ConnectionFactory>` usable for the database,
//! message-bus, and cache backends this crate talks to.

mod connection;
mod manager;
mod metrics;
mod waiter;

pub use connection::ConnectionState;
pub use manager::{ConnectionFactory, Pool, PoolConfig, PooledGuard};
pub use metrics::{PoolMetrics, PoolMetricsSnapshot};

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::Result;
    use crate::model::Priority;

    struct CountingFactory {
        created: AtomicUsize,
    }

    #[async_trait]
    impl ConnectionFactory for CountingFactory {
        type Connection = usize;

        async fn create(&self) -> Result<usize> {
            Ok(self.created.fetch_add(1, Ordering::SeqCst))
        }

        async fn validate(&self, _conn: &usize) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn respects_max_size() {
        let pool = Pool::new(
            CountingFactory { created: AtomicUsize::new(0) },
            PoolConfig { min_size: 0, max_size: 2, ..Default::default() },
        );

        let a = pool.acquire(Priority::Normal, Duration::from_millis(50)).await.unwrap();
        let b = pool.acquire(Priority::Normal, Duration::from_millis(50)).await.unwrap();
        assert_eq!(pool.active_connections(), 2);

        let timeout_result = pool.acquire(Priority::Normal, Duration::from_millis(50)).await;
        assert!(timeout_result.is_err());

        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn priority_preempts_normal_waiter() {
        let pool = Pool::new(
            CountingFactory { created: AtomicUsize::new(0) },
            PoolConfig { min_size: 0, max_size: 1, ..Default::default() },
        );

        let held = pool.acquire(Priority::Normal, Duration::from_millis(50)).await.unwrap();

        let pool_a = Arc::clone(&pool);
        let normal_waiter = tokio::spawn(async move {
            pool_a.acquire(Priority::Normal, Duration::from_secs(2)).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let pool_b = Arc::clone(&pool);
        let critical_waiter = tokio::spawn(async move {
            pool_b.acquire(Priority::Critical, Duration::from_secs(2)).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(held);

        let critical_first = critical_waiter.await.unwrap();
        assert!(critical_first.is_ok());

        drop(critical_first.unwrap());
        let normal_second = normal_waiter.await.unwrap();
        assert!(normal_second.is_ok());
    }

    #[tokio::test]
    async fn close_rejects_waiters() {
        let pool = Pool::new(
            CountingFactory { created: AtomicUsize::new(0) },
            PoolConfig { min_size: 0, max_size: 1, ..Default::default() },
        );
        let _held = pool.acquire(Priority::Normal, Duration::from_millis(50)).await.unwrap();
        let pool_a = Arc::clone(&pool);
        let waiter = tokio::spawn(async move {
            pool_a.acquire(Priority::Normal, Duration::from_secs(2)).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.close();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(crate::error::HeimdallError::PoolClosed)));
    }
}
