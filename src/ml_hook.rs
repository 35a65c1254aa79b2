//! ML enrichment/insight hook (spec.md §1: ML model training and serving
//! are out of scope; this module is the seam a future implementation would
//! plug into, not a model runtime).

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{LogEntry, QueryResult};

/// Best-effort ML integration point, called from two places: the
/// Ingestion Pipeline (§4.7 "if the ML hook is configured, a best-effort
/// invocation attaches `ml` fields") and the Query Service (§4.9 step 4
/// "if `mlFeatures` is set ... append ML insights").
#[async_trait]
pub trait MlHook: Send + Sync {
    /// Attaches `entry.ml`. Failures are the caller's to swallow — ingestion
    /// never fails a batch because enrichment failed.
    async fn enrich(&self, entry: &mut LogEntry) -> Result<()>;

    /// Produces free-form insight strings for `QueryResult::insights`.
    async fn annotate(&self, result: &QueryResult) -> Result<Vec<String>>;
}

/// No ML model wired up: enrichment is a no-op, insights are empty.
pub struct NoopMlHook;

#[async_trait]
impl MlHook for NoopMlHook {
    async fn enrich(&self, _entry: &mut LogEntry) -> Result<()> {
        Ok(())
    }

    async fn annotate(&self, _result: &QueryResult) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
