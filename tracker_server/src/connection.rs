//! Per-connection relays between a subscriber WebSocket and the hub.
//!
//! `attach` completes the upgrade handshake, registers the subscriber and runs
//! two threads that share nothing but the subscriber's outbound queue and the
//! hub's event channel:
//!
//! - egress drains the outbound queue in order and sends one text message per
//!   frame. It ends when the hub closes the queue or when a send fails; in both
//!   cases it closes the WebSocket and shuts the socket down, which in turn
//!   wakes the ingress side.
//! - ingress reads inbound messages only to notice the peer going away.
//!   Messages (e.g. keep-alive `PING`s) are logged and ignored, including text
//!   that is not valid UTF-8. On close, a read error or an oversized message it
//!   unregisters the subscriber, so every closed connection leaves the hub's
//!   set exactly once from this side.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use log::{debug, error, info, warn};
use tracker_common::net::MAX_MESSAGE_BYTES;
use tracker_common::{Result, TrackerError};
use tungstenite::protocol::{Role, WebSocketConfig};
use tungstenite::{Error as WsError, Message as WsMessage, WebSocket};

use crate::hub::{Frame, HubHandle, Subscriber, SubscriberId};

/// Time a new connection gets to finish the upgrade handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest a single send may block before the peer is given up on.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Frame and message limits applied to every subscriber socket.
fn socket_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(MAX_MESSAGE_BYTES);
    config.max_frame_size = Some(MAX_MESSAGE_BYTES);
    config
}

fn ws_error(err: WsError) -> TrackerError {
    match err {
        WsError::Io(e) => TrackerError::Io(e),
        other => TrackerError::WebSocket(other.to_string()),
    }
}

/// Upgrade `stream` to a WebSocket, register it as a subscriber and start
/// both relays. Blocks for the handshake only.
pub fn attach(stream: TcpStream, hub: &HubHandle, queue_capacity: usize) -> Result<SubscriberId> {
    let peer = stream.peer_addr()?;
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    let ingress = tungstenite::accept_with_config(stream, Some(socket_config()))
        .map_err(|e| TrackerError::WebSocket(format!("handshake with {} failed: {}", peer, e)))?;

    let socket = ingress.get_ref();
    socket.set_read_timeout(None)?;
    socket.set_write_timeout(Some(WRITE_TIMEOUT))?;
    let egress = WebSocket::from_raw_socket(socket.try_clone()?, Role::Server, Some(socket_config()));

    let (subscriber, outbound) = Subscriber::new(queue_capacity);
    let id = subscriber.id();
    hub.register(subscriber);
    info!("Subscriber {} attached from {}", id, peer);

    thread::spawn(move || {
        let mut egress = egress;
        match egress_relay(id, &outbound, &mut egress) {
            Ok(sent) => debug!("Subscriber {} egress finished after {} frames", id, sent),
            Err(e) => error!("Error writing to subscriber {}: {}", id, e),
        }
        let _ = egress.get_ref().shutdown(Shutdown::Both);
    });

    let hub = hub.clone();
    thread::spawn(move || {
        let mut ingress = ingress;
        let received = ingress_relay(id, &mut ingress, &hub);
        debug!("Subscriber {} ingress finished after {} messages", id, received);
        let _ = ingress.get_ref().shutdown(Shutdown::Both);
    });

    Ok(id)
}

/// Send every queued frame to `socket` as one text message until the queue
/// closes, then close the WebSocket. Returns the number of frames sent.
pub fn egress_relay<S: Read + Write>(
    id: SubscriberId,
    outbound: &Receiver<Frame>,
    socket: &mut WebSocket<S>,
) -> Result<usize> {
    let mut sent = 0usize;
    for frame in outbound.iter() {
        socket.send(WsMessage::text(frame.as_ref())).map_err(ws_error)?;
        sent += 1;
    }
    debug!("Subscriber {} outbound queue closed", id);
    if let Err(e) = socket.close(None) {
        debug!("Subscriber {} close frame not delivered: {}", id, e);
    }
    Ok(sent)
}

/// Consume inbound messages until the peer closes or the connection fails,
/// then unregister `id`. Returns the number of data messages read.
pub fn ingress_relay<S: Read + Write>(
    id: SubscriberId,
    socket: &mut WebSocket<S>,
    hub: &HubHandle,
) -> usize {
    let mut received = 0usize;
    loop {
        match socket.read() {
            Ok(WsMessage::Text(text)) => {
                received += 1;
                debug!("Subscriber {} sent {:?}", id, text.trim());
            }
            Ok(WsMessage::Binary(data)) => {
                received += 1;
                debug!("Subscriber {} sent {} binary bytes", id, data.len());
            }
            Ok(WsMessage::Close(frame)) => debug!("Subscriber {} is closing: {:?}", id, frame),
            Ok(_) => {}
            Err(WsError::Utf8) => warn!("Subscriber {} sent text that is not UTF-8, ignored", id),
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                debug!("Subscriber {} connection closed", id);
                break;
            }
            Err(e) => {
                warn!("Subscriber {} read error: {}", id, e);
                break;
            }
        }
    }
    hub.unregister(id);
    received
}
