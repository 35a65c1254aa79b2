use async_trait::async_trait;

use super::ResourceUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureLevel {
    Warning,
    Critical,
}

/// Implemented by components that must shed resident state under memory
/// or connection pressure (spec.md §4.2: "Subscribed caches MUST reduce
/// their resident set; pools SHOULD drain idle connections above their
/// minimum"). Grounded on the teacher's callback-based
/// `memory/pressure.rs` design, simplified to a single async trait method
/// so listeners compose as ordinary `Arc<dyn PressureListener>` values
/// instead of boxed closures in a registry.
#[async_trait]
pub trait PressureListener: Send + Sync {
    async fn on_pressure(&self, level: PressureLevel, usage: &ResourceUsage);
}
