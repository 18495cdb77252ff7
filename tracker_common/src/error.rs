//! Error types shared between the tracker server and client.
//!
//! `TrackerError` unifies the failure cases for I/O, JSON encoding, the
//! subscriber WebSocket, lookups and configuration so crates can propagate a single
//! error type. Two narrower enums describe the external collaborators:
//! `FetchError` for the quote source and `StoreError` for persistence. Both
//! convert into `TrackerError`, but the tracking loop handles them locally:
//! neither is ever fatal to a running server.
use std::io;

use thiserror::Error;

/// Unified error type shared by server and client.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// I/O error originating from sockets or files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed protocol line or value with a human-readable message.
    #[error("Format error: {0}")]
    Format(String),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Channel receive failed (sender closed); contains a short context string.
    #[error("Channel receive failed: {0}")]
    ChannelRecv(String),

    /// WebSocket handshake or framing failure on the subscriber stream.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Symbol is not tracked or has no stored data.
    #[error("not found: {0}")]
    NotFound(String),

    /// Symbol failed validation.
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// Invalid startup configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Quote source failure.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure returned by a quote source for a single symbol.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    /// Provider answered with a non-success status code.
    #[error("provider returned status code {0}")]
    HttpStatus(u16),

    /// Provider payload could not be decoded.
    #[error("failed to parse quote: {0}")]
    Parse(String),

    /// Provider does not know the symbol (or refused to answer for it).
    #[error("invalid symbol or provider limit reached: {0}")]
    InvalidSymbol(String),
}

impl FetchError {
    /// Stable label used as a metrics key.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network_error",
            FetchError::HttpStatus(_) => "http_error",
            FetchError::Parse(_) => "parse_error",
            FetchError::InvalidSymbol(_) => "invalid_symbol",
        }
    }
}

/// Failure returned by the persistence collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Requested record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Journal file could not be read or written.
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backing store refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_kinds_are_stable_labels() {
        assert_eq!(FetchError::Network("timeout".into()).kind(), "network_error");
        assert_eq!(FetchError::HttpStatus(503).kind(), "http_error");
        assert_eq!(FetchError::Parse("price".into()).kind(), "parse_error");
        assert_eq!(FetchError::InvalidSymbol("ZZZZ".into()).kind(), "invalid_symbol");
    }

    #[test]
    fn store_not_found_maps_into_tracker_error() {
        let err: TrackerError = StoreError::NotFound("stock AAPL".into()).into();
        assert_eq!(err.to_string(), "stock AAPL not found");
    }
}
