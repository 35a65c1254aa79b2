use std::cmp::Ordering;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::model::Priority;

pub enum WaiterOutcome {
    Granted(Uuid),
    Closed,
}

/// A queued acquirer. Ordered so that `BinaryHeap::pop` returns the
/// highest-priority, earliest-arrived waiter first: `CRITICAL > HIGH >
/// NORMAL > LOW`, FIFO among equal priorities (spec.md §4.1, testable
/// property 7).
pub struct Waiter {
    pub priority: Priority,
    pub seq: u64,
    pub sender: oneshot::Sender<WaiterOutcome>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority sorts greater (served first by a max-heap).
        // Among equal priorities, the *smaller* seq (earlier arrival)
        // must sort greater so it is popped first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
