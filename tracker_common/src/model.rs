//! Domain types exchanged between the tracker and its subscribers.
//!
//! `Stock` is the latest-known state of one tracked symbol. `PriceRecord` and
//! `Alert` are immutable facts handed to persistence by value. `Message` is the
//! envelope pushed to live subscribers: one JSON object per WebSocket text
//! frame, tagged with `type` (`stock_update` or `alert`) and carrying the fact
//! under `payload`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::TrackerError;

/// Latest-known state of a tracked symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    /// Ticker symbol; the registry key, never changed after creation.
    pub symbol: String,
    /// Price from the latest successful fetch.
    pub current_price: f64,
    /// Value of `current_price` right before the latest update.
    pub previous_price: f64,
    /// Percent change reported with the latest fetch.
    pub change_percent: f64,
    /// Time of the latest successful fetch; `None` until the first one.
    pub last_updated: Option<DateTime<Utc>>,
}

impl Stock {
    /// Zero-valued state for a freshly tracked symbol.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            current_price: 0.0,
            previous_price: 0.0,
            change_percent: 0.0,
            last_updated: None,
        }
    }

    /// Shift the one-slot history and record a new observation.
    pub fn update_price(&mut self, new_price: f64, change_percent: f64, at: DateTime<Utc>) {
        self.previous_price = self.current_price;
        self.current_price = new_price;
        self.change_percent = change_percent;
        self.last_updated = Some(at);
    }
}

/// Append-only price observation.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub symbol: String,
    pub price: f64,
    pub change_percent: f64,
    pub timestamp: DateTime<Utc>,
}

impl PriceRecord {
    /// Record for the latest observation held by `stock`.
    pub fn from_stock(stock: &Stock) -> Self {
        Self {
            symbol: stock.symbol.clone(),
            price: stock.current_price,
            change_percent: stock.change_percent,
            timestamp: stock.last_updated.unwrap_or_else(Utc::now),
        }
    }
}

/// Direction of a threshold crossing.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertType {
    Increase,
    Decrease,
}

/// Immutable record of a triggered threshold alert.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub symbol: String,
    pub alert_type: AlertType,
    /// Threshold (percent) in force when the alert fired.
    pub threshold: f64,
    /// Human-readable description, e.g. `AAPL changed by 6.00% (from $150.00 to $159.00)`.
    pub message: String,
    pub triggered_at: DateTime<Utc>,
}

/// Envelope pushed to stream subscribers.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Message {
    StockUpdate(Stock),
    Alert(Alert),
}

impl Message {
    /// Encode as a single JSON object.
    pub fn to_json(&self) -> Result<String, TrackerError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one frame received from the stream.
    pub fn from_json(line: &str) -> Result<Self, TrackerError> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn update_price_keeps_one_slot_history() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 15, 30, 0).unwrap();
        let mut stock = Stock::new("AAPL");
        stock.update_price(150.0, 1.2, at);
        stock.update_price(159.0, 6.0, at);

        assert_eq!(stock.previous_price, 150.0);
        assert_eq!(stock.current_price, 159.0);
        assert_eq!(stock.change_percent, 6.0);
        assert_eq!(stock.last_updated, Some(at));
    }

    #[test]
    fn alert_type_uses_snake_case_on_every_surface() {
        assert_eq!(AlertType::Increase.to_string(), "increase");
        assert_eq!(AlertType::from_str("decrease").unwrap(), AlertType::Decrease);
        assert_eq!(serde_json::to_string(&AlertType::Decrease).unwrap(), "\"decrease\"");
    }

    #[test]
    fn message_envelope_is_tagged_with_type_and_payload() {
        let stock = Stock::new("TSLA");
        let json = Message::StockUpdate(stock.clone()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "stock_update");
        assert_eq!(value["payload"]["symbol"], "TSLA");
        assert_eq!(Message::from_json(&format!("{json}\n")).unwrap(), Message::StockUpdate(stock));
    }

    #[test]
    fn alert_envelope_carries_alert_fields() {
        let alert = Alert {
            symbol: "AAPL".into(),
            alert_type: AlertType::Increase,
            threshold: 5.0,
            message: "AAPL changed by 6.00% (from $150.00 to $159.00)".into(),
            triggered_at: Utc.with_ymd_and_hms(2024, 3, 1, 15, 30, 0).unwrap(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&Message::Alert(alert).to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "alert");
        assert_eq!(value["payload"]["alert_type"], "increase");
        assert_eq!(value["payload"]["threshold"], 5.0);
    }
}
