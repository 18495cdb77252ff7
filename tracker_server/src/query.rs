//! Read-side query handling plus the watch-list admin commands.
//!
//! Live stock state comes from the registry, history and alerts from the
//! repository. Every failure becomes an `error` response; nothing here closes
//! the connection or touches the tracking loop.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use log::debug;
use tracker_common::query::{
    DEFAULT_ALERT_LIMIT, DEFAULT_HISTORY_LIMIT, DEFAULT_HISTORY_WINDOW_HOURS, Health,
};
use tracker_common::symbols::normalize_symbol;
use tracker_common::{Query, QueryResponse, Result, StoreError, TrackerError};

use crate::metrics::Metrics;
use crate::model::registry::StockRegistry;
use crate::store::Repository;
use crate::tracker;

/// Answers `Query` values against the registry, store and metrics.
pub struct QueryService {
    registry: Arc<StockRegistry>,
    repo: Arc<dyn Repository>,
    metrics: Arc<Metrics>,
    started_at: Instant,
}

impl QueryService {
    /// Service over shared state; uptime counts from this call.
    pub fn new(
        registry: Arc<StockRegistry>,
        repo: Arc<dyn Repository>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            repo,
            metrics,
            started_at: Instant::now(),
        }
    }

    /// Answer `query`. Failures become `error` responses, never panics.
    pub fn handle(&self, query: Query) -> QueryResponse {
        debug!("Handling query {:?}", query);
        self.dispatch(query).unwrap_or_else(error_response)
    }

    fn dispatch(&self, query: Query) -> Result<QueryResponse> {
        let response = match query {
            Query::ListStocks => QueryResponse::Stocks(self.registry.list()),
            Query::GetStock { symbol } => {
                let symbol = normalize_symbol(&symbol)?;
                let stock = self
                    .registry
                    .get(&symbol)
                    .ok_or_else(|| TrackerError::NotFound(format!("stock {symbol}")))?;
                QueryResponse::Stock(stock)
            }
            Query::PriceHistory {
                symbol,
                from,
                to,
                limit,
            } => {
                let symbol = normalize_symbol(&symbol)?;
                let to = to.unwrap_or_else(Utc::now);
                let from = from.unwrap_or(to - Duration::hours(DEFAULT_HISTORY_WINDOW_HOURS));
                if from > to {
                    return Err(TrackerError::Format(format!(
                        "`from` ({from}) is after `to` ({to})"
                    )));
                }
                let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
                QueryResponse::Prices(self.repo.price_history(&symbol, from, to, limit)?)
            }
            Query::Alerts { symbol, limit } => {
                let symbol = normalize_symbol(&symbol)?;
                let limit = limit.unwrap_or(DEFAULT_ALERT_LIMIT);
                QueryResponse::Alerts(self.repo.alerts(&symbol, limit)?)
            }
            Query::RecentAlerts { limit } => {
                let limit = limit.unwrap_or(DEFAULT_ALERT_LIMIT);
                QueryResponse::Alerts(self.repo.recent_alerts(limit)?)
            }
            Query::Health => QueryResponse::Health(Health {
                status: "healthy".to_string(),
                time: Utc::now(),
                tracked_stocks: self.registry.len(),
                active_subscribers: self.metrics.active_subscribers(),
                uptime_secs: self.started_at.elapsed().as_secs(),
            }),
            Query::Metrics => QueryResponse::Metrics(self.metrics.snapshot()),
            Query::Track { symbol } => {
                let symbol = normalize_symbol(&symbol)?;
                let added =
                    tracker::track(&self.registry, self.repo.as_ref(), &self.metrics, &symbol);
                let message = if added {
                    format!("{symbol} is now tracked")
                } else {
                    format!("{symbol} is already tracked")
                };
                QueryResponse::Ack { message }
            }
            Query::Untrack { symbol } => {
                let symbol = normalize_symbol(&symbol)?;
                if !tracker::untrack(&self.registry, self.repo.as_ref(), &self.metrics, &symbol) {
                    return Err(TrackerError::NotFound(format!("stock {symbol}")));
                }
                QueryResponse::Ack {
                    message: format!("{symbol} is no longer tracked"),
                }
            }
        };
        Ok(response)
    }
}

/// Map an error onto the `error` codes understood by clients.
pub fn error_response(err: TrackerError) -> QueryResponse {
    let code = match &err {
        TrackerError::NotFound(_) | TrackerError::Store(StoreError::NotFound(_)) => "not_found",
        TrackerError::InvalidSymbol(_) | TrackerError::Format(_) | TrackerError::SerdeJson(_) => {
            "bad_request"
        }
        _ => "internal",
    };
    QueryResponse::error(code, err.to_string())
}
