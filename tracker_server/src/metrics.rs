//! Fire-and-forget counters and gauges.
//!
//! Every recorder takes `&self` and never fails, so any thread can report
//! without coordination. `snapshot` copies the current values into the
//! serialisable `MetricsSnapshot` served on the query port.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracker_common::query::{MetricsSnapshot, PriceGauge};
use tracker_common::{AlertType, FetchError};

/// Process-wide metrics sink.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Quote fetches that returned a price.
    fetch_success: AtomicU64,
    /// Quote fetches that failed, all kinds.
    fetch_errors: AtomicU64,
    /// Keyed by `FetchError::kind`.
    fetch_errors_by_kind: Mutex<BTreeMap<String, u64>>,
    /// Duration of the most recent fetch.
    fetch_duration_last_ms: AtomicU64,
    /// Running total of fetch durations.
    fetch_duration_total_ms: AtomicU64,
    /// Per-symbol updates that completed.
    updates_success: AtomicU64,
    /// Per-symbol updates that failed.
    updates_failed: AtomicU64,
    /// Keyed by `AlertType` in snake case.
    alerts_by_type: Mutex<BTreeMap<String, u64>>,
    /// Symbols currently in the registry.
    tracked_stocks: AtomicI64,
    /// Tracking cycles run.
    update_cycles: AtomicU64,
    /// Store writes that failed.
    persistence_failures: AtomicU64,
    /// Gauge written only by the hub thread.
    active_subscribers: AtomicU64,
    /// Subscribers dropped for a full queue.
    subscriber_evictions: AtomicU64,
    /// Publishes lost to a full hub event channel.
    broadcasts_dropped: AtomicU64,
    /// Alerts lost to a full notification queue.
    notifications_dropped: AtomicU64,
    /// Latest price gauges of tracked symbols only.
    prices: Mutex<BTreeMap<String, PriceGauge>>,
}

impl Metrics {
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// One successful quote fetch that took `elapsed`.
    pub fn record_fetch_success(&self, elapsed: Duration) {
        self.fetch_success.fetch_add(1, Ordering::Relaxed);
        self.record_fetch_duration(elapsed);
    }

    /// One failed quote fetch, counted in total and under its kind.
    pub fn record_fetch_error(&self, elapsed: Duration, err: &FetchError) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
        self.record_fetch_duration(elapsed);
        let mut by_kind = self
            .fetch_errors_by_kind
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *by_kind.entry(err.kind().to_string()).or_default() += 1;
    }

    fn record_fetch_duration(&self, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        self.fetch_duration_last_ms.store(ms, Ordering::Relaxed);
        self.fetch_duration_total_ms.fetch_add(ms, Ordering::Relaxed);
    }

    /// Outcome of one per-symbol update.
    pub fn record_update(&self, success: bool) {
        if success {
            self.updates_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.updates_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current price and change-percent gauges for `symbol`.
    pub fn set_price(&self, symbol: &str, price: f64, change_percent: f64) {
        let mut prices = self.prices.lock().unwrap_or_else(PoisonError::into_inner);
        prices.insert(
            symbol.to_string(),
            PriceGauge {
                price,
                change_percent,
            },
        );
    }

    /// One triggered alert of `alert_type`.
    pub fn record_alert(&self, alert_type: AlertType) {
        let mut by_type = self
            .alerts_by_type
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *by_type.entry(alert_type.to_string()).or_default() += 1;
    }

    /// A symbol joined the registry.
    pub fn stock_tracked(&self) {
        self.tracked_stocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements the tracked gauge and forgets the symbol's price gauges.
    pub fn stock_untracked(&self, symbol: &str) {
        self.tracked_stocks.fetch_sub(1, Ordering::Relaxed);
        let mut prices = self.prices.lock().unwrap_or_else(PoisonError::into_inner);
        prices.remove(symbol);
    }

    /// One tracking cycle finished, interrupted or not.
    pub fn record_cycle(&self) {
        self.update_cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// A store write failed and was logged instead of propagated.
    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Written only by the hub thread.
    pub fn set_active_subscribers(&self, count: usize) {
        self.active_subscribers.store(count as u64, Ordering::Relaxed);
    }

    /// Current number of hub subscribers.
    pub fn active_subscribers(&self) -> u64 {
        self.active_subscribers.load(Ordering::Relaxed)
    }

    /// A subscriber was dropped because its queue was full.
    pub fn record_eviction(&self) {
        self.subscriber_evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// A publish found the hub's event channel full.
    pub fn record_broadcast_dropped(&self) {
        self.broadcasts_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// An alert notification found the notifier queue full.
    pub fn record_notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter and gauge.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fetch_success: self.fetch_success.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            fetch_errors_by_kind: self
                .fetch_errors_by_kind
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            fetch_duration_last_ms: self.fetch_duration_last_ms.load(Ordering::Relaxed),
            fetch_duration_total_ms: self.fetch_duration_total_ms.load(Ordering::Relaxed),
            updates_success: self.updates_success.load(Ordering::Relaxed),
            updates_failed: self.updates_failed.load(Ordering::Relaxed),
            alerts_by_type: self
                .alerts_by_type
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            tracked_stocks: self.tracked_stocks.load(Ordering::Relaxed),
            update_cycles: self.update_cycles.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            active_subscribers: self.active_subscribers.load(Ordering::Relaxed),
            subscriber_evictions: self.subscriber_evictions.load(Ordering::Relaxed),
            broadcasts_dropped: self.broadcasts_dropped.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            prices: self
                .prices
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
