//! Shared networking constants and helpers used by client and server.

/// TCP port of the subscriber WebSocket (server -> client updates and alerts).
pub const STREAM_PORT: u16 = 8080;
/// TCP port of the query endpoint (request/response, one JSON object per line).
pub const QUERY_PORT: u16 = 8081;
/// Keep-alive text message a streaming client sends; the server logs and ignores it.
pub const PING: &str = "PING";
/// Largest query line or inbound stream message the server accepts, in bytes.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Helper to format an address with a port like "ip:port".
pub fn addr(ip: &str, port: u16) -> String {
    format!("{}:{}", ip, port)
}

/// WebSocket URL of the subscriber stream at `address` ("ip:port").
pub fn stream_url(address: &str) -> String {
    format!("ws://{}/ws", address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_points_at_ws_path() {
        assert_eq!(stream_url(&addr("127.0.0.1", STREAM_PORT)), "ws://127.0.0.1:8080/ws");
    }
}
