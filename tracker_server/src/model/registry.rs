//! Symbol registry: the latest-known `Stock` per tracked symbol.
//!
//! The registry exclusively owns the symbol map and guards it with a single
//! reader-writer lock. Every method acquires the lock, touches the map, copies
//! out what the caller needs and releases the lock before returning, so no
//! caller can hold it across a fetch, a store write or a broadcast.
//!
//! - `add` / `remove` maintain the tracked set and the tracked-count gauge.
//! - `snapshot_symbols` copies the keys for a tracking cycle.
//! - `update` shifts the one-slot price history of a still-tracked symbol and
//!   returns the new state by value. A symbol removed between snapshot and
//!   update yields `None`; the caller discards the observation.
//!
//! The per-symbol price gauge is written and dropped under the same write lock
//! as the entry itself, so a late update can never revive the gauge of a
//! symbol that `remove` already dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use log::info;
use tracker_common::Stock;

use crate::metrics::Metrics;

/// Tracks stocks keyed by symbol, iterated in symbol order.
pub struct StockRegistry {
    stocks: RwLock<BTreeMap<String, Stock>>,
    metrics: Arc<Metrics>,
}

impl StockRegistry {
    /// Create an empty registry reporting to `metrics`.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            stocks: RwLock::new(BTreeMap::new()),
            metrics,
        }
    }

    /// Start tracking `symbol`. Returns the zero-valued entry when it was
    /// inserted, `None` when the symbol was already tracked.
    pub fn add(&self, symbol: &str) -> Option<Stock> {
        let stock = Stock::new(symbol);
        let tracked = {
            let mut stocks = self.write();
            if stocks.contains_key(symbol) {
                return None;
            }
            stocks.insert(symbol.to_string(), stock.clone());
            self.metrics.stock_tracked();
            stocks.len()
        };
        info!("Added {} to tracking list ({} tracked)", symbol, tracked);
        Some(stock)
    }

    /// Stop tracking `symbol`. Returns whether it was tracked.
    pub fn remove(&self, symbol: &str) -> bool {
        let tracked = {
            let mut stocks = self.write();
            if stocks.remove(symbol).is_none() {
                return false;
            }
            self.metrics.stock_untracked(symbol);
            stocks.len()
        };
        info!("Removed {} from tracking list ({} tracked)", symbol, tracked);
        true
    }

    /// Copy of the tracked symbols, in symbol order.
    pub fn snapshot_symbols(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Record a fresh observation for `symbol` if it is still tracked.
    pub fn update(&self, symbol: &str, new_price: f64, new_change_percent: f64) -> Option<Stock> {
        let mut stocks = self.write();
        let stock = stocks.get_mut(symbol)?;
        stock.update_price(new_price, new_change_percent, Utc::now());
        self.metrics
            .set_price(symbol, stock.current_price, stock.change_percent);
        Some(stock.clone())
    }

    /// Latest state of `symbol`, if tracked.
    pub fn get(&self, symbol: &str) -> Option<Stock> {
        self.read().get(symbol).cloned()
    }

    /// Copy of every tracked stock, in symbol order.
    pub fn list(&self) -> Vec<Stock> {
        self.read().values().cloned().collect()
    }

    /// Number of tracked symbols.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Stock>> {
        self.stocks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Stock>> {
        self.stocks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn registry() -> (StockRegistry, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        (StockRegistry::new(metrics.clone()), metrics)
    }

    #[test]
    fn add_is_idempotent() {
        let (registry, metrics) = registry();
        assert!(registry.add("AAPL").is_some());
        assert!(registry.add("AAPL").is_none());

        assert_eq!(registry.len(), 1);
        assert_eq!(metrics.snapshot().tracked_stocks, 1);
        assert_eq!(registry.get("AAPL"), Some(Stock::new("AAPL")));
    }

    #[test]
    fn remove_of_untracked_symbol_is_a_no_op() {
        let (registry, metrics) = registry();
        registry.add("MSFT");
        assert!(!registry.remove("TSLA"));
        assert!(registry.remove("MSFT"));
        assert!(!registry.remove("MSFT"));

        assert!(registry.is_empty());
        assert_eq!(metrics.snapshot().tracked_stocks, 0);
    }

    #[test]
    fn tracked_set_matches_replayed_operations() {
        let (registry, metrics) = registry();
        let ops: [(bool, &str); 9] = [
            (true, "AAPL"),
            (true, "MSFT"),
            (false, "AAPL"),
            (true, "TSLA"),
            (true, "MSFT"),
            (false, "GOOGL"),
            (true, "AAPL"),
            (false, "TSLA"),
            (true, "NVDA"),
        ];

        let mut expected = BTreeSet::new();
        for (add, symbol) in ops {
            if add {
                registry.add(symbol);
                expected.insert(symbol.to_string());
            } else {
                registry.remove(symbol);
                expected.remove(symbol);
            }
        }

        let tracked: BTreeSet<String> = registry.snapshot_symbols().into_iter().collect();
        assert_eq!(tracked, expected);
        assert_eq!(metrics.snapshot().tracked_stocks, expected.len() as i64);
    }

    #[test]
    fn snapshot_is_in_symbol_order() {
        let (registry, _) = registry();
        for symbol in ["TSLA", "AAPL", "MSFT"] {
            registry.add(symbol);
        }
        assert_eq!(registry.snapshot_symbols(), vec!["AAPL", "MSFT", "TSLA"]);
    }

    #[test]
    fn update_shifts_previous_price() {
        let (registry, _) = registry();
        registry.add("AAPL");

        let first = registry.update("AAPL", 150.0, 0.4).unwrap();
        assert_eq!(first.previous_price, 0.0);
        assert!(first.last_updated.is_some());

        let second = registry.update("AAPL", 159.0, 6.4).unwrap();
        assert_eq!(second.previous_price, 150.0);
        assert_eq!(second.current_price, 159.0);
        assert_eq!(second.change_percent, 6.4);
        assert_eq!(registry.get("AAPL"), Some(second));
    }

    #[test]
    fn update_of_removed_symbol_is_discarded() {
        let (registry, metrics) = registry();
        registry.add("AAPL");
        let symbols = registry.snapshot_symbols();
        registry.remove("AAPL");

        assert_eq!(registry.update(&symbols[0], 150.0, 0.0), None);
        assert!(registry.get("AAPL").is_none());
        assert!(metrics.snapshot().prices.is_empty());
    }

    #[test]
    fn update_sets_price_gauge_and_remove_drops_it() {
        let (registry, metrics) = registry();
        registry.add("MSFT");
        registry.update("MSFT", 410.0, 1.25);

        let gauge = metrics.snapshot().prices["MSFT"];
        assert_eq!((gauge.price, gauge.change_percent), (410.0, 1.25));

        registry.remove("MSFT");
        assert!(!metrics.snapshot().prices.contains_key("MSFT"));
    }

    #[test]
    fn concurrent_readers_and_writer() {
        let (registry, _) = registry();
        let registry = Arc::new(registry);
        registry.add("AAPL");

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for n in 0..100 {
                        if i == 0 {
                            registry.update("AAPL", 100.0 + n as f64, 0.0);
                        } else {
                            let _ = registry.list();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stock = registry.get("AAPL").unwrap();
        assert_eq!(stock.current_price, 199.0);
        assert_eq!(stock.previous_price, 198.0);
    }
}
