//! In-memory repository, the default store and the read side of the journal.
//!
//! Price records and alerts are each capped at `retention` rows; once a table
//! is full the oldest row is dropped for every new one.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracker_common::{Alert, PriceRecord, Stock, StoreError};

use super::Repository;

#[derive(Default)]
struct Tables {
    stocks: BTreeMap<String, Stock>,
    prices: VecDeque<PriceRecord>,
    alerts: VecDeque<Alert>,
}

/// Rows kept per table when no retention is configured.
pub const DEFAULT_RETENTION: usize = 100_000;

/// Repository backed by process memory.
pub struct MemoryRepository {
    tables: RwLock<Tables>,
    retention: usize,
}

impl MemoryRepository {
    /// Store keeping `DEFAULT_RETENTION` rows per table.
    #[cfg(test)]
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Store keeping at most `retention` price records and as many alerts.
    pub fn with_retention(retention: usize) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            retention: retention.max(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn push_capped<T>(rows: &mut VecDeque<T>, row: T, retention: usize) {
    while rows.len() >= retention {
        rows.pop_front();
    }
    rows.push_back(row);
}

/// Newest-first copy of at most `limit` matching rows.
fn newest_first<T: Clone>(
    rows: &VecDeque<T>,
    limit: usize,
    matches: impl Fn(&T) -> bool,
    key: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    let mut selected: Vec<T> = rows.iter().filter(|row| matches(row)).cloned().collect();
    selected.sort_by(|a, b| key(b).cmp(&key(a)));
    selected.truncate(limit);
    selected
}

impl Repository for MemoryRepository {
    fn create_stock(&self, stock: &Stock) -> Result<(), StoreError> {
        self.write()
            .stocks
            .entry(stock.symbol.clone())
            .or_insert_with(|| stock.clone());
        Ok(())
    }

    fn update_stock(&self, stock: &Stock) -> Result<(), StoreError> {
        match self.write().stocks.get_mut(&stock.symbol) {
            Some(row) => {
                *row = stock.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("stock {}", stock.symbol))),
        }
    }

    fn get_stock(&self, symbol: &str) -> Result<Stock, StoreError> {
        self.read()
            .stocks
            .get(symbol)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("stock {symbol}")))
    }

    fn list_stocks(&self) -> Result<Vec<Stock>, StoreError> {
        Ok(self.read().stocks.values().cloned().collect())
    }

    fn delete_stock(&self, symbol: &str) -> Result<(), StoreError> {
        match self.write().stocks.remove(symbol) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!("stock {symbol}"))),
        }
    }

    fn save_price(&self, record: &PriceRecord) -> Result<(), StoreError> {
        push_capped(&mut self.write().prices, record.clone(), self.retention);
        Ok(())
    }

    fn price_history(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PriceRecord>, StoreError> {
        Ok(newest_first(
            &self.read().prices,
            limit,
            |p| p.symbol == symbol && p.timestamp >= from && p.timestamp <= to,
            |p| p.timestamp,
        ))
    }

    fn save_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        push_capped(&mut self.write().alerts, alert.clone(), self.retention);
        Ok(())
    }

    fn alerts(&self, symbol: &str, limit: usize) -> Result<Vec<Alert>, StoreError> {
        Ok(newest_first(
            &self.read().alerts,
            limit,
            |a| a.symbol == symbol,
            |a| a.triggered_at,
        ))
    }

    fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        Ok(newest_first(&self.read().alerts, limit, |_| true, |a| a.triggered_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tracker_common::AlertType;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 15, minute, 0).unwrap()
    }

    fn price(symbol: &str, price: f64, minute: u32) -> PriceRecord {
        PriceRecord {
            symbol: symbol.into(),
            price,
            change_percent: 0.0,
            timestamp: at(minute),
        }
    }

    fn alert(symbol: &str, minute: u32) -> Alert {
        Alert {
            symbol: symbol.into(),
            alert_type: AlertType::Decrease,
            threshold: 5.0,
            message: format!("{symbol} moved"),
            triggered_at: at(minute),
        }
    }

    #[test]
    fn create_stock_keeps_existing_row() {
        let repo = MemoryRepository::new();
        let mut stock = Stock::new("AAPL");
        repo.create_stock(&stock).unwrap();
        stock.update_price(150.0, 1.0, at(0));
        repo.update_stock(&stock).unwrap();
        repo.create_stock(&Stock::new("AAPL")).unwrap();

        assert_eq!(repo.get_stock("AAPL").unwrap().current_price, 150.0);
    }

    #[test]
    fn missing_rows_are_not_found() {
        let repo = MemoryRepository::new();
        assert!(matches!(repo.get_stock("ZZZ"), Err(StoreError::NotFound(_))));
        assert!(matches!(repo.update_stock(&Stock::new("ZZZ")), Err(StoreError::NotFound(_))));
        assert!(matches!(repo.delete_stock("ZZZ"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn price_history_filters_range_and_orders_newest_first() {
        let repo = MemoryRepository::new();
        for (p, minute) in [(100.0, 1), (101.0, 2), (102.0, 3), (103.0, 4)] {
            repo.save_price(&price("AAPL", p, minute)).unwrap();
        }
        repo.save_price(&price("MSFT", 400.0, 2)).unwrap();

        let history = repo.price_history("AAPL", at(2), at(4), 10).unwrap();
        let prices: Vec<f64> = history.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![103.0, 102.0, 101.0]);

        let limited = repo.price_history("AAPL", at(0), at(0) + Duration::hours(1), 2).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].price, 103.0);
    }

    #[test]
    fn oldest_rows_are_dropped_past_retention() {
        let repo = MemoryRepository::with_retention(3);
        for minute in 1..=5 {
            repo.save_price(&price("AAPL", 100.0 + minute as f64, minute)).unwrap();
            repo.save_alert(&alert("AAPL", minute)).unwrap();
        }

        let history = repo.price_history("AAPL", at(0), at(59), 10).unwrap();
        let prices: Vec<f64> = history.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![105.0, 104.0, 103.0]);
        let alerts = repo.recent_alerts(10).unwrap();
        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[2].triggered_at, at(3));
    }

    #[test]
    fn alerts_are_newest_first_per_symbol_and_globally() {
        let repo = MemoryRepository::new();
        repo.save_alert(&alert("AAPL", 1)).unwrap();
        repo.save_alert(&alert("MSFT", 2)).unwrap();
        repo.save_alert(&alert("AAPL", 3)).unwrap();

        let aapl = repo.alerts("AAPL", 10).unwrap();
        assert_eq!(aapl.len(), 2);
        assert_eq!(aapl[0].triggered_at, at(3));

        let recent = repo.recent_alerts(2).unwrap();
        let symbols: Vec<&str> = recent.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    }
}
