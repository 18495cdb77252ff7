//! Tracking loop: the periodic driver of the whole server.
//!
//! Each cycle copies the tracked symbols out of the registry and walks them in
//! order. For every symbol it fetches a snapshot, records it in the registry,
//! persists it, publishes a `stock_update` and runs the alert monitor. A fetch
//! failure is counted and the cycle moves on; a symbol removed while the cycle
//! was running is skipped. Calls are paced by `fetch_delay`, and the pause
//! doubles as the shutdown check so Ctrl-C never waits out the full delay.
//!
//! The first cycle runs immediately; later cycles follow a `tick` of
//! `interval` until the shutdown channel fires or closes.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, select, tick};
use log::{debug, error, info, warn};
use tracker_common::{FetchError, PriceRecord, Stock, StoreError};

use crate::alert::AlertMonitor;
use crate::hub::HubHandle;
use crate::metrics::Metrics;
use crate::model::registry::StockRegistry;
use crate::source::QuoteSource;
use crate::store::Repository;

/// Timing of the tracking loop.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Period between the starts of two cycles.
    pub interval: Duration,
    /// Pause between two fetches within a cycle.
    pub fetch_delay: Duration,
}

/// Per-cycle counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Symbols attempted.
    pub total: usize,
    /// Fetched and applied.
    pub success: usize,
    /// Fetch failed; the symbol keeps its previous state.
    pub failed: usize,
    /// Fetched fine, but removed from the registry mid-cycle.
    pub skipped: usize,
    /// The cycle stopped early because shutdown was requested.
    pub interrupted: bool,
}

/// Drives fetch, update, persist, publish and alert for every tracked symbol.
pub struct Tracker<S: QuoteSource> {
    registry: Arc<StockRegistry>,
    source: S,
    monitor: AlertMonitor,
    hub: HubHandle,
    repo: Arc<dyn Repository>,
    metrics: Arc<Metrics>,
    config: TrackerConfig,
}

impl<S: QuoteSource> Tracker<S> {
    /// Tracker over `registry`, fetching from `source`.
    pub fn new(
        registry: Arc<StockRegistry>,
        source: S,
        monitor: AlertMonitor,
        hub: HubHandle,
        repo: Arc<dyn Repository>,
        metrics: Arc<Metrics>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            registry,
            source,
            monitor,
            hub,
            repo,
            metrics,
            config,
        }
    }

    /// Run cycles until `shutdown` receives a value or is disconnected.
    pub fn run(&mut self, shutdown: &Receiver<()>) {
        info!(
            "Tracker started: provider={} interval={:?} fetch_delay={:?} threshold={}%",
            self.source.provider(),
            self.config.interval,
            self.config.fetch_delay,
            self.monitor.threshold()
        );

        if self.registry.is_empty() {
            warn!("Watch-list is empty, cycles stay idle until a symbol is tracked");
        }
        info!("Performing initial stock update");
        if self.cycle_and_display(shutdown) {
            let ticker = tick(self.config.interval);
            loop {
                select! {
                    recv(ticker) -> _ => {
                        if !self.cycle_and_display(shutdown) {
                            break;
                        }
                    }
                    recv(shutdown) -> _ => break,
                }
            }
        }
        info!("Tracker stopped");
    }

    /// Returns `false` once shutdown was requested.
    fn cycle_and_display(&mut self, shutdown: &Receiver<()>) -> bool {
        let report = self.run_cycle(shutdown);
        if report.interrupted {
            return false;
        }
        info!("\n{}", render_table(&self.registry.list()));
        true
    }

    /// One pass over the symbols tracked right now.
    pub fn run_cycle(&mut self, shutdown: &Receiver<()>) -> CycleReport {
        info!("Starting update cycle for all stocks");
        let symbols = self.registry.snapshot_symbols();
        let mut report = CycleReport::default();

        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 && !self.pause(shutdown) {
                report.interrupted = true;
                break;
            }
            report.total += 1;
            match self.update_stock(symbol) {
                Ok(Some(_)) => report.success += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    error!("Error updating stock in batch symbol={}: {}", symbol, e);
                }
            }
        }

        self.metrics.record_cycle();
        info!(
            "Completed update cycle total={} success={} failed={} skipped={}",
            report.total, report.success, report.failed, report.skipped
        );
        if report.interrupted {
            warn!("Update cycle interrupted by shutdown");
        }
        report
    }

    /// Fetch and apply one symbol. `Ok(None)` means the symbol was no
    /// longer tracked when its price arrived.
    pub fn update_stock(&mut self, symbol: &str) -> Result<Option<Stock>, FetchError> {
        debug!("Starting stock update symbol={}", symbol);
        let started = Instant::now();
        let fetched = self.source.fetch(symbol);
        let elapsed = started.elapsed();

        let snapshot = match fetched {
            Ok(snapshot) => {
                self.metrics.record_fetch_success(elapsed);
                snapshot
            }
            Err(e) => {
                self.metrics.record_fetch_error(elapsed, &e);
                self.metrics.record_update(false);
                return Err(e);
            }
        };

        let Some(stock) = self
            .registry
            .update(symbol, snapshot.price, snapshot.change_percent)
        else {
            debug!("{} is no longer tracked, discarding its price", symbol);
            return Ok(None);
        };

        self.persist(&stock);
        self.hub.publish_stock_update(&stock);
        self.monitor.check(&stock);
        self.metrics.record_update(true);

        info!(
            "Successfully updated stock symbol={} price={:.2} change_percent={:.2} duration_ms={}",
            stock.symbol,
            stock.current_price,
            stock.change_percent,
            elapsed.as_millis()
        );
        Ok(Some(stock))
    }

    fn persist(&self, stock: &Stock) {
        if let Err(e) = self.repo.save_price(&PriceRecord::from_stock(stock)) {
            self.metrics.record_persistence_failure();
            error!("Failed to save price for {}: {}", stock.symbol, e);
        }
        match self.repo.update_stock(stock) {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                debug!("{} was untracked mid-update, stored row is gone", stock.symbol);
            }
            Err(e) => {
                self.metrics.record_persistence_failure();
                error!("Failed to update stored stock {}: {}", stock.symbol, e);
            }
        }
    }

    /// Wait `fetch_delay`; `false` when shutdown fired or its sender is gone.
    fn pause(&self, shutdown: &Receiver<()>) -> bool {
        matches!(
            shutdown.recv_timeout(self.config.fetch_delay),
            Err(RecvTimeoutError::Timeout)
        )
    }
}

/// Start tracking `symbol` in the registry and, if it is new, in the store.
/// Returns whether the symbol was newly added.
pub fn track(
    registry: &StockRegistry,
    repo: &dyn Repository,
    metrics: &Metrics,
    symbol: &str,
) -> bool {
    let Some(stock) = registry.add(symbol) else {
        return false;
    };
    if let Err(e) = repo.create_stock(&stock) {
        metrics.record_persistence_failure();
        error!("Failed to store new stock {}: {}", symbol, e);
    }
    true
}

/// Stop tracking `symbol` and delete its stored row. Returns whether it was tracked.
pub fn untrack(
    registry: &StockRegistry,
    repo: &dyn Repository,
    metrics: &Metrics,
    symbol: &str,
) -> bool {
    if !registry.remove(symbol) {
        return false;
    }
    if let Err(e) = repo.delete_stock(symbol) {
        metrics.record_persistence_failure();
        error!("Failed to delete stored stock {}: {}", symbol, e);
    }
    true
}

/// Console view of the tracked stocks, one row per symbol.
pub fn render_table(stocks: &[Stock]) -> String {
    let rule = "=".repeat(43);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "Stock Tracker Update - {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "{rule}");
    for stock in stocks {
        let arrow = if stock.change_percent > 0.0 {
            "↑"
        } else if stock.change_percent < 0.0 {
            "↓"
        } else {
            "→"
        };
        let last = stock
            .last_updated
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        let _ = writeln!(
            out,
            "{:<6}: ${:<8.2} {} {:.2}% (Last: {})",
            stock.symbol, stock.current_price, arrow, stock.change_percent, last
        );
    }
    let _ = write!(out, "{rule}");
    out
}
