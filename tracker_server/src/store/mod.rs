//! Persistence collaborator.
//!
//! Plain CRUD over stocks, price history and alerts. Nothing here is coupled
//! to the registry's in-memory state: the tracker hands records over by value
//! and treats every failure as log-and-continue.

pub mod journal;
pub mod memory;

use chrono::{DateTime, Utc};
use tracker_common::{Alert, PriceRecord, Stock, StoreError};

pub use journal::JournalRepository;
pub use memory::{DEFAULT_RETENTION, MemoryRepository};

/// Storage of stocks, price history and alerts.
pub trait Repository: Send + Sync {
    /// Insert `stock`, or keep the existing row if the symbol is known.
    fn create_stock(&self, stock: &Stock) -> Result<(), StoreError>;
    /// Overwrite the row of `stock.symbol`; `NotFound` if it was never created
    /// or has been deleted.
    fn update_stock(&self, stock: &Stock) -> Result<(), StoreError>;
    /// Stored row of `symbol`.
    fn get_stock(&self, symbol: &str) -> Result<Stock, StoreError>;
    /// All stocks ordered by symbol.
    fn list_stocks(&self) -> Result<Vec<Stock>, StoreError>;
    /// Remove the row of `symbol`. History and alerts are kept.
    fn delete_stock(&self, symbol: &str) -> Result<(), StoreError>;

    /// Append one price observation.
    fn save_price(&self, record: &PriceRecord) -> Result<(), StoreError>;
    /// Records of `symbol` with `from <= timestamp <= to`, newest first.
    fn price_history(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PriceRecord>, StoreError>;

    /// Append one triggered alert.
    fn save_alert(&self, alert: &Alert) -> Result<(), StoreError>;
    /// Alerts of `symbol`, newest first.
    fn alerts(&self, symbol: &str, limit: usize) -> Result<Vec<Alert>, StoreError>;
    /// Alerts of every symbol, newest first.
    fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError>;
}
