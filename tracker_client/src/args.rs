//! Command-line arguments for the tracker client.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracker_common::Query;
use tracker_common::net::{QUERY_PORT, STREAM_PORT};

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Host name or IP address of the tracker server.
    #[arg(long, env = "TRACKER_SERVER", default_value = "127.0.0.1")]
    pub server: String,

    /// Port of the subscriber stream.
    #[arg(long, default_value_t = STREAM_PORT)]
    pub stream_port: u16,

    /// Port of the query endpoint.
    #[arg(long, default_value_t = QUERY_PORT)]
    pub query_port: u16,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// What the client should do.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Follow live stock updates and alerts until Ctrl+C.
    Watch {
        /// Only print these symbols (comma or space separated).
        #[arg(long)]
        symbols: Option<String>,
    },
    /// List every tracked stock.
    Stocks,
    /// Show one tracked stock.
    Stock { symbol: String },
    /// Price history of a symbol, newest first.
    History {
        symbol: String,
        #[arg(long)]
        limit: Option<usize>,
        /// Start of the range (RFC 3339), defaults to 24 hours before `--to`.
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// End of the range (RFC 3339), defaults to now.
        #[arg(long)]
        to: Option<DateTime<Utc>>,
    },
    /// Alerts of one symbol, or the most recent alerts of all symbols.
    Alerts {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Server health.
    Health,
    /// Server counters and gauges.
    Metrics,
    /// Add a symbol to the server's watch-list.
    Track { symbol: String },
    /// Remove a symbol from the server's watch-list.
    Untrack { symbol: String },
}

impl Command {
    /// The query this command sends, `None` for `watch`.
    pub fn to_query(&self) -> Option<Query> {
        let query = match self.clone() {
            Command::Watch { .. } => return None,
            Command::Stocks => Query::ListStocks,
            Command::Stock { symbol } => Query::GetStock { symbol },
            Command::History {
                symbol,
                limit,
                from,
                to,
            } => Query::PriceHistory {
                symbol,
                from,
                to,
                limit,
            },
            Command::Alerts {
                symbol: Some(symbol),
                limit,
            } => Query::Alerts { symbol, limit },
            Command::Alerts {
                symbol: None,
                limit,
            } => Query::RecentAlerts { limit },
            Command::Health => Query::Health,
            Command::Metrics => Query::Metrics,
            Command::Track { symbol } => Query::Track { symbol },
            Command::Untrack { symbol } => Query::Untrack { symbol },
        };
        Some(query)
    }
}
