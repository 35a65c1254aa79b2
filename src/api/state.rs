//! Shared, cloneable handle to the wired-up core, injected into every
//! handler via axum's `State` extractor.
//!
//! Grounded on the teacher's `ApiState` (`api/rest/types.rs`): the same
//! "one `Arc`-wrapped struct, `Clone` derive, constructor injection"
//! shape, generalized from a connection-pool/session-map surface to the
//! ingestion/query/subscription/resource surface this crate actually has.

use std::sync::Arc;
use std::time::Instant;

use crate::cache::QueryCache;
use crate::ingestion::IngestionPipeline;
use crate::ml_hook::MlHook;
use crate::query::QueryService;
use crate::resource_manager::ResourceManager;
use crate::storage::StorageManager;
use crate::subscription::SubscriptionManager;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionPipeline>,
    pub query_service: Arc<QueryService>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub storage: Arc<StorageManager>,
    pub cache: Arc<QueryCache>,
    pub resources: Arc<ResourceManager>,
    pub ml_hook: Arc<dyn MlHook>,
    pub started_at: Arc<Instant>,
}
