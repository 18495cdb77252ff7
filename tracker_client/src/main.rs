//! Tracker Client: follows the live stream of a tracker server or sends it a
//! single query.
//!
//! `watch` opens the subscriber WebSocket, prints every stock update and
//! alert (optionally only for some symbols) and keeps the connection alive
//! with periodic `PING`s until Ctrl+C or until the server closes the stream.
//! Every other command sends one query to the query port and prints the
//! response as pretty JSON.
//!
//! Usage example (CLI):
//! ```bash
//! tracker_client --server 192.168.0.10 watch --symbols AAPL,MSFT
//! tracker_client history AAPL --limit 20
//! tracker_client track NVDA
//! ```
#![warn(missing_docs)]
mod args;
mod sender;

use std::collections::HashSet;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use clap::Parser;
use log::{LevelFilter, debug, error, info, warn};
use tracker_common::net::{addr, stream_url};
use tracker_common::symbols::parse_symbol_list;
use tracker_common::{Message, QueryResponse, Result, TrackerError};
use tungstenite::error::ProtocolError;
use tungstenite::{Error as WsError, Message as WsMessage, WebSocket};

use crate::args::{Args, Command};
use crate::sender::CommandSender;

/// Symbols the user asked to see; `None` shows everything.
type SymbolFilter = Option<HashSet<String>>;

/// Reads text frames from `socket` and logs them until shutdown or close.
fn start_receiver_loop<S: Read + Write>(
    mut socket: WebSocket<S>,
    filter: &SymbolFilter,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    info!("Stream receiver running");
    while !shutdown.load(Ordering::Relaxed) {
        match socket.read() {
            Ok(WsMessage::Text(text)) => match Message::from_json(&text) {
                Ok(message) => {
                    if let Some(line) = describe(&message, filter) {
                        match message {
                            Message::StockUpdate(_) => info!("{}", line),
                            Message::Alert(_) => warn!("{}", line),
                        }
                    }
                }
                Err(_) => debug!("Received non-JSON message: {}", text.trim()),
            },
            Ok(WsMessage::Close(_)) => info!("Server is closing the stream"),
            Ok(other) => debug!("Ignoring {} byte control or binary frame", other.len()),
            Err(WsError::Io(e))
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed)
            | Err(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)) => {
                info!("Server closed the stream");
                return Ok(());
            }
            Err(e) => {
                error!("Receive data error: {}", e);
                return Err(TrackerError::WebSocket(e.to_string()));
            }
        }
    }
    info!("Receiver loop stopping...");
    if let Err(e) = socket.close(None) {
        debug!("Close handshake not sent: {}", e);
    }
    Ok(())
}

/// One printable line for `message`, or `None` when the filter hides it.
fn describe(message: &Message, filter: &SymbolFilter) -> Option<String> {
    let symbol = match message {
        Message::StockUpdate(stock) => &stock.symbol,
        Message::Alert(alert) => &alert.symbol,
    };
    if let Some(wanted) = filter {
        if !wanted.contains(symbol) {
            return None;
        }
    }
    let text = match message {
        Message::StockUpdate(stock) => format!(
            "UPDATE: {} Price={:.2} Change={:+.2}% Time={}",
            stock.symbol,
            stock.current_price,
            stock.change_percent,
            stock
                .last_updated
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string())
        ),
        Message::Alert(alert) => format!(
            "ALERT [{}]: {} at {}",
            alert.alert_type,
            alert.message,
            alert.triggered_at.format("%H:%M:%S")
        ),
    };
    Some(text)
}

fn watch(args: &Args, symbols: &Option<String>, shutdown: Arc<AtomicBool>) -> Result<()> {
    let filter: SymbolFilter = match symbols {
        Some(list) => Some(parse_symbol_list(list)?.into_iter().collect()),
        None => None,
    };
    if let Some(wanted) = &filter {
        info!("Symbols: {:?}", wanted);
    }

    let server_address = addr(&args.server, args.stream_port);
    info!("Connecting to stream at {}", server_address);
    let stream = TcpStream::connect(&server_address)
        .map_err(|e| TrackerError::Format(format!("Failed to connect to server: {}", e)))?;
    let (socket, _) = tungstenite::client(stream_url(&server_address), stream)
        .map_err(|e| TrackerError::WebSocket(format!("Handshake failed: {}", e)))?;
    socket
        .get_ref()
        .set_read_timeout(Some(Duration::from_secs(1)))?;

    let _pinger = CommandSender::start_ping_thread(socket.get_ref().try_clone()?, shutdown.clone());

    info!("Client is running. Press Ctrl+C to exit.");
    let result = start_receiver_loop(socket, &filter, shutdown.clone());
    shutdown.store(true, Ordering::SeqCst);
    result
}

fn run_query(args: &Args) -> Result<()> {
    let Some(query) = args.command.to_query() else {
        return Ok(());
    };
    let server_address = addr(&args.server, args.query_port);
    let response = CommandSender::query(&server_address, &query)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    match response {
        QueryResponse::Error(body) if body.error == "not_found" => {
            Err(TrackerError::NotFound(body.message))
        }
        QueryResponse::Error(body) => Err(TrackerError::Format(body.message)),
        _ => Ok(()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.debug);

    match &args.command {
        Command::Watch { symbols } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let shutdown = shutdown.clone();
                ctrlc::set_handler(move || {
                    info!("Ctrl+C received. Shutting down client...");
                    shutdown.store(true, Ordering::SeqCst);
                })
                .map_err(|e| TrackerError::Config(format!("Error setting Ctrl+C handler: {e}")))?;
            }
            watch(&args, symbols, shutdown)
        }
        _ => run_query(&args),
    }
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
