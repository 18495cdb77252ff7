//! Stock tracker server.
//!
//! Polls prices for a watch-list of symbols, keeps the latest state per symbol,
//! raises threshold alerts and streams both updates and alerts to every
//! connected subscriber. The binary wires the pieces together:
//!
//! - `Tracker` runs the periodic update cycles on its own thread.
//! - `Hub` owns the subscriber set and fans messages out from its own thread.
//! - `StreamListener` upgrades each accepted connection to a WebSocket and
//!   turns it into a subscriber with an egress and an ingress relay thread.
//! - `QueryListener` answers JSON queries (stocks, history, alerts, health,
//!   metrics) and runtime `track`/`untrack` commands.
//! - The alert notifier drains the bounded notification queue.
//!
//! Shutdown (Ctrl-C): the tracker finishes its in-flight fetch and stops, then
//! the hub closes every subscriber queue, then the notifier drains and exits.
//!
//! ```bash
//! tracker_server --symbols AAPL,MSFT --interval-secs 60 --fetch-delay-ms 500
//! ```
#![warn(missing_docs)]
mod alert;
mod config;
mod connection;
mod hub;
mod listener;
mod metrics;
mod model;
mod query;
mod source;
mod store;
mod tracker;

use std::sync::Arc;
use std::thread;

use clap::Parser;
use crossbeam_channel::bounded;
use log::{LevelFilter, error, info};
use tracker_common::{Result, TrackerError};

use crate::alert::AlertMonitor;
use crate::config::Config;
use crate::hub::Hub;
use crate::listener::{QueryListener, StreamListener};
use crate::metrics::Metrics;
use crate::model::registry::StockRegistry;
use crate::query::QueryService;
use crate::source::SimulatedSource;
use crate::store::{JournalRepository, MemoryRepository, Repository};
use crate::tracker::{Tracker, TrackerConfig};

fn main() -> Result<()> {
    let config = Config::parse();
    init_logger(config.debug);
    config.validate()?;
    let symbols = config.watch_list()?;

    let metrics = Arc::new(Metrics::new());
    let repo: Arc<dyn Repository> = match &config.data_dir {
        Some(dir) => Arc::new(JournalRepository::open(dir, config.retention)?),
        None => {
            info!("No data dir configured, keeping history in memory");
            Arc::new(MemoryRepository::with_retention(config.retention))
        }
    };

    let registry = Arc::new(StockRegistry::new(Arc::clone(&metrics)));
    for symbol in &symbols {
        tracker::track(&registry, repo.as_ref(), &metrics, symbol);
    }

    let (hub, hub_handle) = Hub::new(config.broadcast_queue, Arc::clone(&metrics));
    let hub_thread = hub.start();

    let (monitor, notifications) = AlertMonitor::new(
        config.alert_threshold,
        config.notification_queue,
        Arc::clone(&repo),
        hub_handle.clone(),
        Arc::clone(&metrics),
    );
    let notifier = alert::spawn_notifier(notifications);

    let stream_listener = StreamListener::bind(
        &config.stream_addr(),
        hub_handle.clone(),
        config.subscriber_queue,
    )?;
    thread::spawn(move || stream_listener.serve());

    let service = QueryService::new(
        Arc::clone(&registry),
        Arc::clone(&repo),
        Arc::clone(&metrics),
    );
    let query_listener = QueryListener::bind(&config.query_addr(), Arc::new(service))?;
    thread::spawn(move || query_listener.serve());

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down server...");
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| TrackerError::Config(format!("cannot install Ctrl+C handler: {e}")))?;

    let source = match config.seed {
        Some(seed) => SimulatedSource::with_seed(seed, config.volatility, config.failure_rate),
        None => SimulatedSource::new(config.volatility, config.failure_rate),
    };
    let mut tracker = Tracker::new(
        registry,
        source,
        monitor,
        hub_handle.clone(),
        repo,
        metrics,
        TrackerConfig {
            interval: config.interval(),
            fetch_delay: config.fetch_delay(),
        },
    );
    info!("Tracking {} symbols: {}", symbols.len(), symbols.join(", "));
    let tracker_thread = thread::spawn(move || tracker.run(&shutdown_rx));

    if tracker_thread.join().is_err() {
        error!("Tracker thread panicked");
    }
    hub_handle.shutdown();
    if hub_thread.join().is_err() {
        error!("Hub thread panicked");
    }
    if notifier.join().is_err() {
        error!("Alert notifier panicked");
    }
    info!("Server stopped");
    Ok(())
}

fn init_logger(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}
