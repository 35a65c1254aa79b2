//! Request/response bodies for the thin HTTP surface (spec.md §6).
//!
//! `LogEntry` and `Query` already carry `Serialize`/`Deserialize` and are
//! used directly as wire types; this module covers only the shapes the
//! core model doesn't already define (health, metrics, subscribe
//! envelopes).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::Query;
use crate::subscription::{DeliverHistorical, OnOverflow};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsResponse {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, u64>,
    pub histograms: HashMap<String, f64>,
}

/// `options` for `subscribe(query, options, callback)` (spec.md §6), as
/// carried over the wire alongside the query in the subscribe request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct WireSubscriptionOptions {
    pub deliver_historical: WireDeliverHistorical,
    pub buffer_size: usize,
    pub on_overflow: WireOnOverflow,
}

impl Default for WireSubscriptionOptions {
    fn default() -> Self {
        Self {
            deliver_historical: WireDeliverHistorical::None,
            buffer_size: 256,
            on_overflow: WireOnOverflow::Block,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireDeliverHistorical {
    #[default]
    None,
    FromTimeRange,
}

impl From<WireDeliverHistorical> for DeliverHistorical {
    fn from(v: WireDeliverHistorical) -> Self {
        match v {
            WireDeliverHistorical::None => DeliverHistorical::None,
            WireDeliverHistorical::FromTimeRange => DeliverHistorical::FromTimeRange,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireOnOverflow {
    #[default]
    Block,
    DropOldest,
}

impl From<WireOnOverflow> for OnOverflow {
    fn from(v: WireOnOverflow) -> Self {
        match v {
            WireOnOverflow::Block => OnOverflow::Block,
            WireOnOverflow::DropOldest => OnOverflow::DropOldest,
        }
    }
}

/// First message a subscribing client sends after the websocket upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeRequest {
    pub query: Query,
    #[serde(default)]
    pub options: WireSubscriptionOptions,
}
