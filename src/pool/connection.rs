use std::collections::HashMap;
use std::time::Instant;

use uuid::Uuid;

/// Per-connection state machine (spec.md §4.1):
/// `CREATED -> IDLE -> ACTIVE -> IDLE -> ... -> DESTROYING -> (gone)`,
/// with `IDLE <-> VALIDATING` a transient sub-state entered on acquire and
/// release. A validation failure routes to `Destroying` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    Idle,
    Validating,
    Active,
    Destroying,
}

/// A pooled resource of type `C` plus the bookkeeping the pool needs
/// around it: state, multi-key tags (for `acquire_by_tag` affinity), and
/// lifetime timestamps used by `idle_timeout` / `max_lifetime` reaping.
pub struct PooledResource<C> {
    pub id: Uuid,
    pub state: ConnectionState,
    pub tags: HashMap<String, String>,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub use_count: u64,
    pub conn: C,
}

impl<C> PooledResource<C> {
    pub fn new(conn: C) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            state: ConnectionState::Created,
            tags: HashMap::new(),
            created_at: now,
            last_used_at: now,
            use_count: 0,
            conn,
        }
    }

    pub fn tag_matches(&self, key: &str, value: &str) -> bool {
        self.tags.get(key).map(|v| v.as_str()) == Some(value)
    }
}
