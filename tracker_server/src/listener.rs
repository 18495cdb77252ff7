//! TCP accept loops for the subscriber WebSocket and the query port.
//!
//! Both loops log per-connection failures and keep accepting; a client that
//! sends garbage or vanishes never takes a listener down. Every connection is
//! served on its own thread, so a slow handshake never stalls the accept loop.
//!
//! Query lines are capped at `MAX_MESSAGE_BYTES`. A longer line, or one that
//! is not UTF-8, is answered with a `bad_request` error and the connection
//! stays open.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use log::{debug, error, info, warn};
use tracker_common::net::MAX_MESSAGE_BYTES;
use tracker_common::query::{decode_line, encode_line};
use tracker_common::{Query, QueryResponse, Result};

use crate::connection;
use crate::hub::HubHandle;
use crate::query::{QueryService, error_response};

/// Accepts subscriber connections and hands each one to the hub.
pub struct StreamListener {
    socket: TcpListener,
    hub: HubHandle,
    queue_capacity: usize,
}

impl StreamListener {
    /// Bind to `bind_addr` (e.g. `0.0.0.0:8080`).
    pub fn bind(bind_addr: &str, hub: HubHandle, queue_capacity: usize) -> Result<Self> {
        let socket = TcpListener::bind(bind_addr)?;
        Ok(Self {
            socket,
            hub,
            queue_capacity,
        })
    }

    /// Address actually bound, useful with port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Blocking accept loop.
    pub fn serve(self) {
        match self.local_addr() {
            Ok(addr) => info!("Subscriber WebSocket is listening on {}", addr),
            Err(e) => warn!("Subscriber stream address unavailable: {}", e),
        }
        for stream in self.socket.incoming() {
            match stream {
                Ok(stream) => {
                    let hub = self.hub.clone();
                    let capacity = self.queue_capacity;
                    thread::spawn(move || {
                        if let Err(e) = connection::attach(stream, &hub, capacity) {
                            error!("Failed to attach subscriber: {}", e);
                        }
                    });
                }
                Err(e) => error!("TCP connection error: {}", e),
            }
        }
    }
}

/// Accepts query connections, one thread per connection.
pub struct QueryListener {
    socket: TcpListener,
    service: Arc<QueryService>,
}

impl QueryListener {
    /// Bind to `bind_addr` (e.g. `0.0.0.0:8081`).
    pub fn bind(bind_addr: &str, service: Arc<QueryService>) -> Result<Self> {
        let socket = TcpListener::bind(bind_addr)?;
        Ok(Self { socket, service })
    }

    /// Address actually bound, useful with port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Blocking accept loop.
    pub fn serve(self) {
        match self.local_addr() {
            Ok(addr) => info!("Query server is listening on {}", addr),
            Err(e) => warn!("Query server address unavailable: {}", e),
        }
        for stream in self.socket.incoming() {
            match stream {
                Ok(stream) => {
                    let service = Arc::clone(&self.service);
                    thread::spawn(move || {
                        if let Err(e) = handle_query_connection(stream, &service) {
                            error!("Query connection failed: {}", e);
                        }
                    });
                }
                Err(e) => error!("TCP connection error: {}", e),
            }
        }
    }
}

fn handle_query_connection(stream: TcpStream, service: &QueryService) -> Result<()> {
    let peer = stream.peer_addr()?;
    debug!("Query client connected from {}", peer);
    let reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let answered = serve_queries(reader, &mut writer, service)?;
    debug!("Query client {} left after {} queries", peer, answered);
    Ok(())
}

enum RequestLine {
    Eof,
    Line,
    TooLong,
}

/// Read one request line into `buf`, keeping at most `MAX_MESSAGE_BYTES` of it.
/// The rest of an over-long line is consumed and dropped.
fn read_request<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<RequestLine> {
    buf.clear();
    let limit = MAX_MESSAGE_BYTES as u64 + 1;
    if Read::take(&mut *reader, limit).read_until(b'\n', buf)? == 0 {
        return Ok(RequestLine::Eof);
    }
    if buf.last() != Some(&b'\n') && buf.len() > MAX_MESSAGE_BYTES {
        reader.skip_until(b'\n')?;
        return Ok(RequestLine::TooLong);
    }
    Ok(RequestLine::Line)
}

/// Answer every non-empty request line with one response line until EOF.
/// A malformed, over-long or non-UTF-8 line gets an `error` response; only
/// I/O failures end the loop.
pub fn serve_queries<R: BufRead, W: Write>(
    mut reader: R,
    writer: &mut W,
    service: &QueryService,
) -> Result<usize> {
    let mut answered = 0usize;
    let mut buf = Vec::new();
    loop {
        let response = match read_request(&mut reader, &mut buf)? {
            RequestLine::Eof => break,
            RequestLine::TooLong => {
                warn!("Rejected query line longer than {} bytes", MAX_MESSAGE_BYTES);
                QueryResponse::error(
                    "bad_request",
                    format!("request line exceeds {} bytes", MAX_MESSAGE_BYTES),
                )
            }
            RequestLine::Line => match std::str::from_utf8(&buf) {
                Err(e) => {
                    warn!("Rejected query line that is not UTF-8: {}", e);
                    QueryResponse::error("bad_request", "request line is not valid UTF-8")
                }
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => match decode_line::<Query>(line) {
                    Ok(query) => service.handle(query),
                    Err(e) => {
                        warn!("Rejected query line {:?}: {}", line.trim(), e);
                        error_response(e)
                    }
                },
            },
        };
        let encoded = match encode_line(&response) {
            Ok(encoded) => encoded,
            Err(e) => encode_line(&QueryResponse::error("internal", e.to_string()))?,
        };
        writer.write_all(encoded.as_bytes())?;
        writer.flush()?;
        answered += 1;
    }
    Ok(answered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;
    use crate::metrics::Metrics;
    use crate::model::registry::StockRegistry;
    use crate::store::MemoryRepository;
    use std::io::Cursor;
    use std::time::Duration;
    use tracker_common::net::stream_url;
    use tracker_common::query::ErrorBody;
    use tracker_common::{Message, Stock};
    use tungstenite::Message as WsMessage;

    fn service() -> QueryService {
        let metrics = Arc::new(Metrics::new());
        let registry = Arc::new(StockRegistry::new(metrics.clone()));
        QueryService::new(registry, Arc::new(MemoryRepository::new()), metrics)
    }

    fn responses(out: Vec<u8>) -> Vec<QueryResponse> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| decode_line(line).unwrap())
            .collect()
    }

    #[test]
    fn each_query_line_gets_one_response_line() {
        let input = concat!(
            "{\"query\":\"track\",\"symbol\":\"MSFT\"}\n",
            "\n",
            "{\"query\":\"list_stocks\"}\n",
        );
        let mut out = Vec::new();
        assert_eq!(serve_queries(Cursor::new(input), &mut out, &service()).unwrap(), 2);

        let replies = responses(out);
        assert!(matches!(replies[0], QueryResponse::Ack { .. }));
        match &replies[1] {
            QueryResponse::Stocks(stocks) => assert_eq!(stocks[0].symbol, "MSFT"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn garbage_line_is_answered_and_connection_continues() {
        let input = "hello there\n{\"query\":\"bogus\"}\n{\"query\":\"health\"}\n";
        let mut out = Vec::new();
        serve_queries(Cursor::new(input), &mut out, &service()).unwrap();

        let replies = responses(out);
        assert_eq!(replies.len(), 3);
        for reply in &replies[..2] {
            assert!(matches!(
                reply,
                QueryResponse::Error(ErrorBody { error, .. }) if error == "bad_request"
            ));
        }
        assert!(matches!(replies[2], QueryResponse::Health(_)));
    }

    fn is_bad_request(reply: &QueryResponse) -> bool {
        matches!(reply, QueryResponse::Error(ErrorBody { error, .. }) if error == "bad_request")
    }

    #[test]
    fn non_utf8_line_is_answered_and_connection_continues() {
        let input: &[u8] = b"\xff\xfe garbage\n{\"query\":\"health\"}\n";
        let mut out = Vec::new();
        assert_eq!(serve_queries(Cursor::new(input), &mut out, &service()).unwrap(), 2);

        let replies = responses(out);
        assert!(is_bad_request(&replies[0]));
        assert!(matches!(replies[1], QueryResponse::Health(_)));
    }

    #[test]
    fn over_long_line_is_rejected_and_skipped() {
        let mut input = vec![b'{'; MAX_MESSAGE_BYTES + 100];
        input.push(b'\n');
        input.extend_from_slice(b"{\"query\":\"health\"}\n");
        let mut out = Vec::new();
        assert_eq!(serve_queries(Cursor::new(input), &mut out, &service()).unwrap(), 2);

        let replies = responses(out);
        assert!(is_bad_request(&replies[0]));
        assert!(matches!(replies[1], QueryResponse::Health(_)));
    }

    #[test]
    fn last_line_without_newline_is_still_answered() {
        let mut out = Vec::new();
        serve_queries(Cursor::new("{\"query\":\"metrics\"}"), &mut out, &service()).unwrap();
        assert!(matches!(responses(out)[0], QueryResponse::Metrics(_)));
    }

    #[test]
    fn query_listener_round_trip_over_tcp() {
        let listener = QueryListener::bind("127.0.0.1:0", Arc::new(service())).unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || listener.serve());

        let mut client = TcpStream::connect(addr).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        client.write_all(b"{\"query\":\"get_stock\",\"symbol\":\"ZZZ\"}\n").unwrap();

        let mut line = String::new();
        BufReader::new(client.try_clone().unwrap()).read_line(&mut line).unwrap();
        assert!(matches!(
            decode_line::<QueryResponse>(&line).unwrap(),
            QueryResponse::Error(ErrorBody { error, .. }) if error == "not_found"
        ));
    }

    #[test]
    fn stream_listener_attaches_subscribers() {
        let metrics = Arc::new(Metrics::new());
        let (hub, handle) = Hub::new(16, metrics.clone());
        let _hub_thread = hub.start();
        let listener = StreamListener::bind("127.0.0.1:0", handle.clone(), 8).unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || listener.serve());

        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut client = match tungstenite::client(stream_url(&addr.to_string()), stream) {
            Ok((client, _response)) => client,
            Err(e) => panic!("handshake failed: {e}"),
        };
        for _ in 0..100 {
            if metrics.active_subscribers() == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(metrics.active_subscribers(), 1);

        let stock = Stock::new("GOOGL");
        handle.publish_stock_update(&stock);
        match client.read().unwrap() {
            WsMessage::Text(text) => {
                assert_eq!(Message::from_json(&text).unwrap(), Message::StockUpdate(stock))
            }
            other => panic!("unexpected {other:?}"),
        }

        handle.shutdown();
        loop {
            match client.read() {
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(e) => panic!("expected a close frame, got {e}"),
            }
        }
    }
}
