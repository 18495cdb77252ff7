//! Talking to the tracker server over TCP.
//!
//! `CommandSender` sends one query line and reads back the response line, and
//! runs the background `PING` loop that keeps a stream subscription visibly
//! alive on the server side. The loop writes its own client-side frames on a
//! clone of the subscription socket, so the receiver keeps the read half.
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info};
use tracker_common::net::PING;
use tracker_common::query::{decode_line, encode_line};
use tracker_common::{Query, QueryResponse, Result, TrackerError};
use tungstenite::protocol::Role;
use tungstenite::{Message as WsMessage, WebSocket};

/// PING interval in milliseconds used by the background thread.
const INTERVAL_MS: u64 = 2000;

/// Helper type for sending commands to the server.
pub struct CommandSender;

impl CommandSender {
    /// Connect to `addr`, send `query` and wait for its response.
    pub fn query(addr: &str, query: &Query) -> Result<QueryResponse> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| TrackerError::Format(format!("Failed to connect to server: {}", e)))?;
        stream.set_read_timeout(Some(Duration::from_secs(10)))?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;
        Self::round_trip(&mut reader, &mut writer, query)
    }

    /// Write `query` as one line and read one response line.
    pub fn round_trip<R: BufRead, W: Write>(
        reader: &mut R,
        writer: &mut W,
        query: &Query,
    ) -> Result<QueryResponse> {
        let line = encode_line(query)?;
        info!("Sending query: {}", line.trim());
        writer.write_all(line.as_bytes())?;
        writer.flush()?;

        let mut reply = String::new();
        if reader.read_line(&mut reply)? == 0 {
            return Err(TrackerError::ChannelRecv(
                "server closed the connection before answering".to_string(),
            ));
        }
        decode_line(&reply)
    }

    /// Send a `PING` text message on the upgraded `stream` every two seconds
    /// until `shutdown` is set or a send fails.
    pub fn start_ping_thread(stream: TcpStream, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
        info!("Ping thread started. Target: {:?}", stream.peer_addr().ok());
        thread::spawn(move || {
            let mut socket = WebSocket::from_raw_socket(stream, Role::Client, None);
            let interval = Duration::from_millis(INTERVAL_MS);
            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(interval);
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                match socket.send(WsMessage::text(PING)) {
                    Ok(()) => debug!("PING sent"),
                    Err(e) => {
                        error!("PING THREAD ERROR: Failed to send PING: {}", e);
                        break;
                    }
                }
            }
            info!("Ping thread stopping...");
        })
    }
}
