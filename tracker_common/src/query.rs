//! Query protocol spoken on the query port.
//!
//! The client writes one `Query` per line and reads one `QueryResponse` per
//! line. Both are JSON: a query is tagged by `query`, a response by `type` with
//! its body under `data`.
//!
//! ```text
//! -> {"query":"get_stock","symbol":"AAPL"}
//! <- {"type":"stock","data":{"symbol":"AAPL","current_price":189.3,...}}
//! ```
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;
use crate::model::{Alert, PriceRecord, Stock};

/// Rows returned by `price_history` when no limit is given.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
/// Window covered by `price_history` when `from` is omitted.
pub const DEFAULT_HISTORY_WINDOW_HOURS: i64 = 24;
/// Rows returned by the alert queries when no limit is given.
pub const DEFAULT_ALERT_LIMIT: usize = 50;

/// Request sent to the query port.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum Query {
    ListStocks,
    GetStock {
        symbol: String,
    },
    PriceHistory {
        symbol: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    Alerts {
        symbol: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    RecentAlerts {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    Health,
    Metrics,
    /// Start tracking a symbol.
    Track {
        symbol: String,
    },
    /// Stop tracking a symbol.
    Untrack {
        symbol: String,
    },
}

/// Reply written back for every query line.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum QueryResponse {
    Stocks(Vec<Stock>),
    Stock(Stock),
    Prices(Vec<PriceRecord>),
    Alerts(Vec<Alert>),
    Health(Health),
    Metrics(MetricsSnapshot),
    Ack { message: String },
    Error(ErrorBody),
}

impl QueryResponse {
    /// Error reply with a machine-readable `error` code.
    pub fn error(error: &str, message: impl Into<String>) -> Self {
        QueryResponse::Error(ErrorBody {
            error: error.to_string(),
            message: message.into(),
        })
    }
}

/// Body of an error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// `not_found`, `bad_request` or `internal`.
    pub error: String,
    /// Human-readable detail.
    pub message: String,
}

/// Liveness report.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub time: DateTime<Utc>,
    pub tracked_stocks: usize,
    pub active_subscribers: u64,
    pub uptime_secs: u64,
}

/// Last observed price gauges for one symbol.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceGauge {
    pub price: f64,
    pub change_percent: f64,
}

/// Point-in-time copy of the server counters and gauges.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub fetch_success: u64,
    pub fetch_errors: u64,
    pub fetch_errors_by_kind: BTreeMap<String, u64>,
    pub fetch_duration_last_ms: u64,
    pub fetch_duration_total_ms: u64,
    pub updates_success: u64,
    pub updates_failed: u64,
    pub alerts_by_type: BTreeMap<String, u64>,
    pub tracked_stocks: i64,
    pub update_cycles: u64,
    pub persistence_failures: u64,
    pub active_subscribers: u64,
    pub subscriber_evictions: u64,
    pub broadcasts_dropped: u64,
    pub notifications_dropped: u64,
    pub prices: BTreeMap<String, PriceGauge>,
}

/// Encode a protocol value as one JSON line, newline included.
pub fn encode_line<T: Serialize>(value: &T) -> Result<String, TrackerError> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

/// Decode one protocol line.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, TrackerError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::Format("empty line".to_string()));
    }
    Ok(serde_json::from_str(trimmed)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_queries_are_tagged_objects() {
        assert_eq!(encode_line(&Query::ListStocks).unwrap(), "{\"query\":\"list_stocks\"}\n");
        assert_eq!(decode_line::<Query>("{\"query\":\"health\"}").unwrap(), Query::Health);
    }

    #[test]
    fn optional_query_fields_may_be_omitted() {
        let query: Query =
            decode_line("{\"query\":\"price_history\",\"symbol\":\"AAPL\"}").unwrap();
        assert_eq!(
            query,
            Query::PriceHistory {
                symbol: "AAPL".into(),
                from: None,
                to: None,
                limit: None,
            }
        );
    }

    #[test]
    fn unknown_query_is_rejected() {
        assert!(decode_line::<Query>("{\"query\":\"drop_tables\"}").is_err());
        assert!(matches!(
            decode_line::<Query>("   "),
            Err(TrackerError::Format(_))
        ));
    }

    #[test]
    fn error_response_shape() {
        let line = encode_line(&QueryResponse::error("not_found", "stock ZZZ not found")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["data"]["error"], "not_found");
    }
}
