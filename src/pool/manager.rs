use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{HeimdallError, Result};
use crate::model::Priority;

use super::connection::{ConnectionState, PooledResource};
use super::metrics::PoolMetrics;
use super::waiter::{Waiter, WaiterOutcome};

/// Produces and validates the underlying resource a pool manages — a
/// database handle, message-bus producer, or cache client (spec.md §4.1).
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;

    async fn create(&self) -> Result<Self::Connection>;

    /// Cheap liveness check run on acquire and on release (spec.md §4.1).
    async fn validate(&self, conn: &Self::Connection) -> bool;
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(3600),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_size > self.max_size {
            return Err(HeimdallError::Configuration(
                "min_size cannot exceed max_size".to_string(),
            ));
        }
        if self.max_size == 0 {
            return Err(HeimdallError::Configuration("max_size must be > 0".to_string()));
        }
        Ok(())
    }
}

struct State<C> {
    /// Connections ready to hand out.
    idle: HashMap<Uuid, PooledResource<C>>,
    idle_order: VecDeque<Uuid>,
    /// Connections currently loaned to a caller (ACTIVE) or mid-validation.
    checked_out: HashMap<Uuid, PooledResource<C>>,
    waiters: BinaryHeap<Waiter>,
    closed: bool,
    next_seq: u64,
}

impl<C> State<C> {
    fn total(&self) -> usize {
        self.idle.len() + self.checked_out.len()
    }
}

/// A bounded, priority-aware, tag-indexed connection pool (spec.md §4.1).
/// Internal state is guarded by a single lock, held only for bookkeeping —
/// never across connection creation or validation I/O (spec.md §5).
pub struct Pool<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<State<F::Connection>>,
    pub metrics: Arc<PoolMetrics>,
}

pub struct PooledGuard<F: ConnectionFactory> {
    pool: Arc<Pool<F>>,
    id: Uuid,
}

impl<F: ConnectionFactory> PooledGuard<F> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn get(&self) -> MappedMutexGuard<'_, F::Connection> {
        MutexGuard::map(self.pool.state.lock(), |s| {
            &mut s.checked_out.get_mut(&self.id).expect("checked out").conn
        })
    }

    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        self.pool.set_tag(self.id, key, value);
    }
}

impl<F: ConnectionFactory> Drop for PooledGuard<F> {
    fn drop(&mut self) {
        let pool = Arc::clone(&self.pool);
        let id = self.id;
        // Validation is async; Drop cannot await, so release is handed to
        // a background task (the teacher's pool manager does the
        // equivalent handoff in `networking/pool/manager.rs`'s event
        // emission path). The resource is removed from `checked_out`
        // synchronously first so a concurrent acquire never sees it as
        // both loaned and idle.
        let resource = {
            let mut state = pool.state.lock();
            state.checked_out.remove(&id)
        };
        if let Some(resource) = resource {
            tokio::spawn(async move {
                pool.finish_release(id, resource).await;
            });
        }
    }
}

impl<F: ConnectionFactory> Pool<F> {
    pub fn new(factory: F, config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            factory,
            config,
            state: Mutex::new(State {
                idle: HashMap::new(),
                idle_order: VecDeque::new(),
                checked_out: HashMap::new(),
                waiters: BinaryHeap::new(),
                closed: false,
                next_seq: 0,
            }),
            metrics: Arc::new(PoolMetrics::default()),
        })
    }

    pub fn active_connections(&self) -> usize {
        self.state.lock().checked_out.len()
    }

    pub fn idle_connections(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn total_connections(&self) -> usize {
        self.state.lock().total()
    }

    /// Acquire a connection, honoring priority order among waiters when
    /// the pool is saturated (spec.md §4.1).
    pub async fn acquire(self: &Arc<Self>, priority: Priority, timeout: Duration) -> Result<PooledGuard<F>> {
        self.acquire_inner(priority, timeout, None).await
    }

    /// Prefer a connection tagged `key=value`; falls back to ordinary
    /// `acquire` when none is idle (spec.md §4.1).
    pub async fn acquire_by_tag(
        self: &Arc<Self>,
        key: &str,
        value: &str,
        priority: Priority,
        timeout: Duration,
    ) -> Result<PooledGuard<F>> {
        self.acquire_inner(priority, timeout, Some((key.to_string(), value.to_string()))).await
    }

    async fn acquire_inner(
        self: &Arc<Self>,
        priority: Priority,
        timeout: Duration,
        tag: Option<(String, String)>,
    ) -> Result<PooledGuard<F>> {
        let deadline = Instant::now() + timeout;
        loop {
            let action = {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(HeimdallError::PoolClosed);
                }

                if let Some(id) = pop_idle_preferring_tag(&mut state, tag.as_ref()) {
                    Action::Validate(id)
                } else if state.total() < self.config.max_size {
                    Action::Create
                } else {
                    let (tx, rx) = oneshot::channel();
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    state.waiters.push(Waiter { priority, seq, sender: tx });
                    Action::Wait(rx)
                }
            };

            match action {
                Action::Validate(id) => {
                    if let Some(guard) = self.validate_and_activate(id).await? {
                        return Ok(guard);
                    }
                    continue;
                }
                Action::Create => {
                    let conn = match self.factory.create().await {
                        Ok(c) => c,
                        Err(e) => {
                            self.metrics.record_create_failure();
                            return Err(e);
                        }
                    };
                    let mut resource = PooledResource::new(conn);
                    resource.state = ConnectionState::Active;
                    resource.use_count += 1;
                    resource.last_used_at = Instant::now();
                    let id = resource.id;
                    {
                        let mut state = self.state.lock();
                        state.checked_out.insert(id, resource);
                    }
                    self.metrics.record_acquire();
                    return Ok(PooledGuard { pool: Arc::clone(self), id });
                }
                Action::Wait(rx) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match tokio::time::timeout(remaining, rx).await {
                        Ok(Ok(WaiterOutcome::Granted(id))) => {
                            return Ok(PooledGuard { pool: Arc::clone(self), id });
                        }
                        Ok(Ok(WaiterOutcome::Closed)) => return Err(HeimdallError::PoolClosed),
                        Ok(Err(_)) => return Err(HeimdallError::PoolClosed),
                        Err(_) => return Err(HeimdallError::AcquireTimeout(timeout)),
                    }
                }
            }
        }
    }

    /// Validates a just-popped idle connection outside the lock, then
    /// either activates it or destroys it and lets the caller retry.
    async fn validate_and_activate(self: &Arc<Self>, id: Uuid) -> Result<Option<PooledGuard<F>>> {
        let mut resource = {
            let mut state = self.state.lock();
            match state.checked_out.remove(&id) {
                Some(r) => r,
                None => return Ok(None),
            }
        };

        let ok = self.factory.validate(&resource.conn).await;
        if !ok {
            self.metrics.record_destroy();
            return Ok(None);
        }

        resource.state = ConnectionState::Active;
        resource.use_count += 1;
        resource.last_used_at = Instant::now();
        {
            let mut state = self.state.lock();
            state.checked_out.insert(id, resource);
        }
        self.metrics.record_acquire();
        Ok(Some(PooledGuard { pool: Arc::clone(self), id }))
    }

    /// Runs off the acquiring task as a background task (spawned from
    /// `Drop`): revalidates the released connection and either returns it
    /// to the idle set, hands it directly to the highest-priority waiter,
    /// or destroys it and (if below `min_size`) spawns a replacement.
    async fn finish_release(self: Arc<Self>, id: Uuid, mut resource: PooledResource<F::Connection>) {
        resource.state = ConnectionState::Validating;
        let ok = self.factory.validate(&resource.conn).await;

        if !ok {
            self.metrics.record_destroy();
            let below_min = {
                let state = self.state.lock();
                !state.closed && state.total() < self.config.min_size
            };
            if below_min {
                if let Ok(conn) = self.factory.create().await {
                    let mut replacement = PooledResource::new(conn);
                    replacement.state = ConnectionState::Idle;
                    let rid = replacement.id;
                    let mut state = self.state.lock();
                    if !state.closed {
                        state.idle.insert(rid, replacement);
                        state.idle_order.push_back(rid);
                    }
                }
            }
            return;
        }

        resource.state = ConnectionState::Idle;
        resource.last_used_at = Instant::now();

        let grant = {
            let mut state = self.state.lock();
            if state.closed {
                None
            } else if let Some(waiter) = state.waiters.pop() {
                resource.state = ConnectionState::Active;
                resource.use_count += 1;
                let id = resource.id;
                state.checked_out.insert(id, resource);
                Some(waiter)
            } else {
                let rid = resource.id;
                state.idle.insert(rid, resource);
                state.idle_order.push_back(rid);
                None
            }
        };

        if let Some(waiter) = grant {
            let _ = waiter.sender.send(WaiterOutcome::Granted(id));
        }
        self.metrics.record_release();
    }

    pub fn set_tag(&self, id: Uuid, key: impl Into<String>, value: impl Into<String>) {
        let mut state = self.state.lock();
        let key = key.into();
        let value = value.into();
        if let Some(r) = state.checked_out.get_mut(&id) {
            r.tags.insert(key, value);
        } else if let Some(r) = state.idle.get_mut(&id) {
            r.tags.insert(key, value);
        }
    }

    pub fn remove_tag(&self, id: Uuid, key: &str) {
        let mut state = self.state.lock();
        if let Some(r) = state.checked_out.get_mut(&id) {
            r.tags.remove(key);
        } else if let Some(r) = state.idle.get_mut(&id) {
            r.tags.remove(key);
        }
    }

    /// Transition to closed: pending waiters receive `PoolClosed`, all
    /// connections are dropped (spec.md §4.1).
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        while let Some(waiter) = state.waiters.pop() {
            let _ = waiter.sender.send(WaiterOutcome::Closed);
        }
        state.idle.clear();
        state.idle_order.clear();
        state.checked_out.clear();
    }
}

fn pop_idle_preferring_tag<C>(
    state: &mut State<C>,
    tag: Option<&(String, String)>,
) -> Option<Uuid> {
    if let Some((key, value)) = tag {
        if let Some(pos) = state
            .idle_order
            .iter()
            .position(|id| state.idle.get(id).map(|r| r.tag_matches(key, value)).unwrap_or(false))
        {
            let id = state.idle_order.remove(pos).unwrap();
            if let Some(resource) = state.idle.remove(&id) {
                state.checked_out.insert(id, resource);
                return Some(id);
            }
        }
    }

    while let Some(id) = state.idle_order.pop_front() {
        if let Some(resource) = state.idle.remove(&id) {
            state.checked_out.insert(id, resource);
            return Some(id);
        }
    }
    None
}

enum Action {
    Validate(Uuid),
    Create,
    Wait(oneshot::Receiver<WaiterOutcome>),
}
