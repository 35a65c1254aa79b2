//! End-to-end exercise of a fully wired system: ingest through the same
//! pipeline the HTTP layer drives, then query it back, the way Scenario A
//! in spec.md §8 describes.

use heimdall::config::Config;
use heimdall::model::{Query, QueryHints, Severity, TimeRange};
use heimdall::Heimdall;

fn now_ns() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos() as i64
}

fn unbounded_query(sources: Vec<&str>) -> Query {
    Query {
        time_range: TimeRange { from: i64::MIN, to: i64::MAX },
        natural_language: None,
        filters: Vec::new(),
        levels: Vec::new(),
        sources: sources.into_iter().map(String::from).collect(),
        text_search: None,
        aggregations: Vec::new(),
        sort: None,
        limit: None,
        offset: None,
        hints: QueryHints::default(),
        ml_features: false,
    }
}

#[tokio::test]
async fn ingest_then_query_round_trip() {
    let heimdall = Heimdall::new(Config::from_env().unwrap());

    let mut entry = heimdall::model::LogEntry::new("checkout", Severity::Info, "order placed");
    entry.timestamp = now_ns();
    let id = entry.id;

    heimdall.ingestion.ingest(entry).await.unwrap();

    let result = heimdall.query_service.query(unbounded_query(vec!["checkout"])).await.unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.logs[0].id, id);

    heimdall.shutdown();
}

#[tokio::test]
async fn batch_ingest_reports_validation_failures() {
    let heimdall = Heimdall::new(Config::from_env().unwrap());

    let mut valid = heimdall::model::LogEntry::new("auth", Severity::Info, "login");
    valid.timestamp = now_ns();
    let mut invalid = heimdall::model::LogEntry::new("auth", Severity::Info, "bad");
    invalid.source.service = String::new(); // fails the "service is required" check

    let result = heimdall.ingestion.ingest_batch(vec![valid, invalid]).await;
    assert_eq!(result.accepted, 1);
    assert_eq!(result.failed, 1);

    let counters = heimdall.ingestion.counters();
    assert_eq!(counters.logs_ingested, 1);
    assert_eq!(counters.logs_failed, 1);

    heimdall.shutdown();
}

#[tokio::test]
async fn query_slot_reservation_is_released_after_use() {
    let heimdall = Heimdall::new(Config::from_env().unwrap());

    {
        let _slot = heimdall.resources.try_reserve_query_slot().unwrap();
    }

    // A second reservation after the guard drops proves the slot was
    // released rather than leaked (testable property 5, spec.md §8).
    let _slot = heimdall.resources.try_reserve_query_slot().unwrap();

    heimdall.shutdown();
}
