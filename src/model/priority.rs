use serde::{Deserialize, Serialize};

/// Shared priority scale used by the Connection Pool's waiter queue
/// (spec.md §4.1) and the Query Cache's placement/eviction rules
/// (spec.md §4.6). Ordered so that `CRITICAL > HIGH > NORMAL > LOW`
/// compares correctly with the derived `Ord` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}
