use crate::error::{HeimdallError, Result};
use crate::ml_hook::MlHook;
use crate::model::{LogEntry, StorageInfo};

/// Required-field and ceiling checks (spec.md §4.7 "Validation").
pub(super) fn validate(entry: &LogEntry) -> Result<()> {
    if entry.source.service.trim().is_empty() {
        return Err(HeimdallError::Validation("source.service is required".to_string()));
    }
    if entry.message.raw.len() > LogEntry::MAX_MESSAGE_LEN {
        return Err(HeimdallError::Validation(format!(
            "message.raw exceeds {} bytes",
            LogEntry::MAX_MESSAGE_LEN
        )));
    }
    Ok(())
}

/// Stamps `storage`, normalizes `timestamp`, defaults
/// `security.classification`, and runs the best-effort ML hook (spec.md
/// §4.7 "Enrichment"). Called only after [`validate`] has passed.
pub(super) async fn enrich(entry: &mut LogEntry, ml_hook: &dyn MlHook) {
    if entry.timestamp == 0 {
        entry.timestamp = now_ns();
    }
    if entry.security.classification.trim().is_empty() {
        entry.security.classification = "public".to_string();
    }
    entry.storage = StorageInfo { tier: crate::model::StorageTier::Hot, compressed: false, indexed: false };

    if let Err(e) = ml_hook.enrich(entry).await {
        tracing::warn!(entry_id = %entry.id, error = %e, "ML enrichment failed, proceeding un-enriched");
    }
}

fn now_ns() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;

    #[test]
    fn rejects_missing_service() {
        let mut entry = LogEntry::new("", Severity::Info, "hi");
        entry.source.service = String::new();
        assert!(validate(&entry).is_err());
    }

    #[test]
    fn rejects_oversized_message() {
        let entry = LogEntry::new("auth", Severity::Info, "x".repeat(LogEntry::MAX_MESSAGE_LEN + 1));
        assert!(validate(&entry).is_err());
    }

    #[tokio::test]
    async fn enrich_defaults_classification_and_timestamp() {
        let mut entry = LogEntry::new("auth", Severity::Info, "hi");
        entry.security.classification = String::new();
        enrich(&mut entry, &crate::ml_hook::NoopMlHook).await;
        assert_eq!(entry.security.classification, "public");
        assert!(entry.timestamp > 0);
        assert_eq!(entry.storage.tier, crate::model::StorageTier::Hot);
    }
}
