//! Command-line and environment configuration of the tracker server.
//!
//! Every option can be given as a flag or through its `TRACKER_*` variable.
//! `Config::validate` runs right after parsing; a failure there aborts startup.
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracker_common::net::{QUERY_PORT, STREAM_PORT, addr};
use tracker_common::symbols::{parse_symbol_list, parse_symbols};
use tracker_common::{Result, TrackerError};

use crate::store::DEFAULT_RETENTION;

/// Parsed server options.
#[derive(Debug, Clone, Parser)]
#[command(version, about = "Stock price tracker server", long_about = None)]
pub struct Config {
    /// TCP port of the subscriber WebSocket.
    #[arg(long, env = "TRACKER_STREAM_PORT", default_value_t = STREAM_PORT)]
    pub stream_port: u16,

    /// TCP port of the query endpoint.
    #[arg(long, env = "TRACKER_QUERY_PORT", default_value_t = QUERY_PORT)]
    pub query_port: u16,

    /// Address both listeners bind to.
    #[arg(long, env = "TRACKER_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Symbols tracked from startup, separated by commas or spaces.
    #[arg(long, env = "TRACKER_SYMBOLS", default_value = "AAPL,GOOGL,MSFT,TSLA")]
    pub symbols: String,

    /// Watch-list file merged with `--symbols`. Symbols may be separated by
    /// commas, spaces or new lines; `#` starts a comment.
    #[arg(long, env = "TRACKER_SYMBOLS_FILE")]
    pub symbols_file: Option<PathBuf>,

    /// Seconds between the starts of two update cycles.
    #[arg(long, env = "TRACKER_INTERVAL_SECS", default_value_t = 300)]
    pub interval_secs: u64,

    /// Pause between two quote fetches, in milliseconds.
    #[arg(long, env = "TRACKER_FETCH_DELAY_MS", default_value_t = 12_000)]
    pub fetch_delay_ms: u64,

    /// Percent move that triggers an alert.
    #[arg(long, env = "TRACKER_ALERT_THRESHOLD", default_value_t = 5.0)]
    pub alert_threshold: f64,

    /// Outbound queue capacity per subscriber.
    #[arg(long, env = "TRACKER_SUBSCRIBER_QUEUE", default_value_t = 256)]
    pub subscriber_queue: usize,

    /// Capacity of the hub event channel.
    #[arg(long, env = "TRACKER_BROADCAST_QUEUE", default_value_t = 256)]
    pub broadcast_queue: usize,

    /// Capacity of the alert notification queue.
    #[arg(long, env = "TRACKER_NOTIFICATION_QUEUE", default_value_t = 100)]
    pub notification_queue: usize,

    /// Directory of the price/alert journal. Data is kept in memory only when absent.
    #[arg(long, env = "TRACKER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Price records (and, separately, alerts) kept in memory for queries.
    #[arg(long, env = "TRACKER_RETENTION", default_value_t = DEFAULT_RETENTION)]
    pub retention: usize,

    /// Largest relative move of the simulated provider per fetch.
    #[arg(long, env = "TRACKER_VOLATILITY", default_value_t = 0.03)]
    pub volatility: f64,

    /// Share of simulated fetches that fail with a network error.
    #[arg(long, env = "TRACKER_FAILURE_RATE", default_value_t = 0.0)]
    pub failure_rate: f64,

    /// Seed of the simulated provider, for reproducible runs.
    #[arg(long, env = "TRACKER_SEED")]
    pub seed: Option<u64>,

    /// Enable debug logging.
    #[arg(long, env = "TRACKER_DEBUG")]
    pub debug: bool,
}

impl Config {
    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.alert_threshold.is_nan() || self.alert_threshold <= 0.0 {
            return Err(config_error("alert threshold must be positive"));
        }
        if self.interval_secs == 0 {
            return Err(config_error("interval must be at least one second"));
        }
        for (name, capacity) in [
            ("subscriber queue", self.subscriber_queue),
            ("broadcast queue", self.broadcast_queue),
            ("notification queue", self.notification_queue),
            ("retention", self.retention),
        ] {
            if capacity == 0 {
                return Err(config_error(&format!("{name} capacity must be at least 1")));
            }
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(config_error("failure rate must be within 0..=1"));
        }
        if self.volatility.is_nan() || self.volatility < 0.0 {
            return Err(config_error("volatility must not be negative"));
        }
        Ok(())
    }

    /// `--symbols` followed by the watch-list file, duplicates removed.
    pub fn watch_list(&self) -> Result<Vec<String>> {
        let mut symbols = parse_symbol_list(&self.symbols)?;
        if let Some(path) = &self.symbols_file {
            let file = File::open(path).map_err(|e| {
                config_error(&format!("cannot open symbols file {}: {}", path.display(), e))
            })?;
            for symbol in parse_symbols(BufReader::new(file))? {
                if !symbols.contains(&symbol) {
                    symbols.push(symbol);
                }
            }
        }
        if symbols.is_empty() {
            return Err(config_error("at least one symbol must be tracked"));
        }
        Ok(symbols)
    }

    /// `bind:stream_port`.
    pub fn stream_addr(&self) -> String {
        addr(&self.bind, self.stream_port)
    }

    /// `bind:query_port`.
    pub fn query_addr(&self) -> String {
        addr(&self.bind, self.query_port)
    }

    /// Tracking period as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Pacing between fetches as a `Duration`.
    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }
}

fn config_error(message: &str) -> TrackerError {
    TrackerError::Config(message.to_string())
}
