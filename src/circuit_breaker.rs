//! Per-dependency circuit breaker (spec.md §4.3).
//!
//! Grounded on `security/circuit_breaker.rs` in the teacher repo, adapted
//! to the spec's explicit rolling-window-by-timestamp semantics rather
//! than a fixed-size outcome deque, and to carry `next_retry` as a wall
//! clock instant so `state()` call sites can report time-to-half-open.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{HeimdallError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure ratio (0.0-1.0) within `monitoring_window` required to trip
    /// the breaker, once `volume_threshold` calls have been observed.
    pub failure_threshold: f64,
    pub reset_timeout: Duration,
    pub monitoring_window: Duration,
    pub half_open_max_calls: u32,
    /// Minimum number of calls inside the window before tripping is even
    /// considered (spec.md §4.3).
    pub volume_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0.5,
            reset_timeout: Duration::from_secs(30),
            monitoring_window: Duration::from_secs(60),
            half_open_max_calls: 5,
            volume_threshold: 10,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.failure_threshold) {
            return Err(HeimdallError::Configuration(
                "failure_threshold must be within [0.0, 1.0]".to_string(),
            ));
        }
        if self.half_open_max_calls == 0 {
            return Err(HeimdallError::Configuration(
                "half_open_max_calls must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Record {
    at: Instant,
    success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
    pub state_transitions: u64,
}

struct Inner {
    state: CircuitState,
    records: VecDeque<Record>,
    next_retry: Option<Instant>,
    half_open_admitted: u32,
    half_open_failed: bool,
    metrics: CircuitBreakerMetrics,
}

/// A single named circuit, one per downstream dependency (spec.md §4.3).
/// Counters for distinct circuits never share a lock (spec.md §5).
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                records: VecDeque::new(),
                next_retry: None,
                half_open_admitted: 0,
                half_open_failed: false,
                metrics: CircuitBreakerMetrics {
                    total_calls: 0,
                    successful_calls: 0,
                    failed_calls: 0,
                    rejected_calls: 0,
                    state_transitions: 0,
                },
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.inner.lock().metrics.clone()
    }

    /// Runs `op` under circuit protection. Fails fast with
    /// `HeimdallError::CircuitOpen` when the circuit is OPEN and
    /// `next_retry` has not yet elapsed (spec.md property 6: O(1), no
    /// downstream attempt).
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if !self.admit() {
            let mut inner = self.inner.lock();
            inner.metrics.rejected_calls += 1;
            return Err(HeimdallError::CircuitOpen(self.name.clone()));
        }

        let result = op().await;
        self.record(result.is_ok());
        result
    }

    /// Whether a call should be let through right now. Transitions
    /// OPEN -> HALF_OPEN when `next_retry` has elapsed.
    fn admit(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let retry_at = inner.next_retry;
                if retry_at.map(|t| Instant::now() >= t).unwrap_or(false) {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_admitted = 0;
                    inner.half_open_failed = false;
                    inner.metrics.state_transitions += 1;
                    tracing::info!(circuit = %self.name, "half-open probe starting");
                    inner.half_open_admitted += 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_admitted < self.config.half_open_max_calls {
                    inner.half_open_admitted += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record(&self, success: bool) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        if success {
            inner.metrics.successful_calls += 1;
        } else {
            inner.metrics.failed_calls += 1;
        }

        let now = Instant::now();
        inner.records.push_back(Record { at: now, success });
        let window = self.config.monitoring_window;
        while let Some(front) = inner.records.front() {
            if now.duration_since(front.at) > window {
                inner.records.pop_front();
            } else {
                break;
            }
        }

        match inner.state {
            CircuitState::Closed => {
                let total = inner.records.len() as u32;
                if total >= self.config.volume_threshold {
                    let failures = inner.records.iter().filter(|r| !r.success).count() as f64;
                    let ratio = failures / total as f64;
                    if ratio >= self.config.failure_threshold {
                        inner.state = CircuitState::Open;
                        inner.next_retry = Some(now + self.config.reset_timeout);
                        inner.metrics.state_transitions += 1;
                        tracing::warn!(circuit = %self.name, ratio, "circuit opened");
                    }
                }
            }
            CircuitState::HalfOpen => {
                if !success {
                    inner.half_open_failed = true;
                    inner.state = CircuitState::Open;
                    inner.next_retry = Some(now + self.config.reset_timeout);
                    inner.metrics.state_transitions += 1;
                    tracing::warn!(circuit = %self.name, "half-open probe failed, reopening");
                } else if inner.half_open_admitted >= self.config.half_open_max_calls
                    && !inner.half_open_failed
                {
                    inner.state = CircuitState::Closed;
                    inner.records.clear();
                    inner.metrics.state_transitions += 1;
                    tracing::info!(circuit = %self.name, "circuit closed after successful probes");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Manual override, used by tests and administrative tooling.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Open;
        inner.next_retry = Some(Instant::now() + self.config.reset_timeout);
        inner.metrics.state_transitions += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn failing() -> Result<()> {
        Err(HeimdallError::StorageUnavailable("boom".to_string()))
    }

    async fn ok() -> Result<()> {
        Ok(())
    }

    #[tokio::test]
    async fn opens_after_volume_and_ratio_exceeded() {
        let cb = CircuitBreaker::new(
            "warm",
            CircuitBreakerConfig {
                failure_threshold: 0.5,
                volume_threshold: 4,
                half_open_max_calls: 1,
                reset_timeout: Duration::from_millis(20),
                monitoring_window: Duration::from_secs(60),
            },
        );

        for _ in 0..4 {
            let _ = cb.call(failing).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let result = cb.call(ok).await;
        assert!(matches!(result, Err(HeimdallError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn half_open_probe_recovers_to_closed() {
        let cb = CircuitBreaker::new(
            "warm",
            CircuitBreakerConfig {
                failure_threshold: 0.5,
                volume_threshold: 2,
                half_open_max_calls: 1,
                reset_timeout: Duration::from_millis(5),
                monitoring_window: Duration::from_secs(60),
            },
        );
        let _ = cb.call(failing).await;
        let _ = cb.call(failing).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let result = cb.call(ok).await;
        assert!(result.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
