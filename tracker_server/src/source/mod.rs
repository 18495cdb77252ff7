//! Quote sources: where the tracking loop gets prices from.
//!
//! A source turns a symbol into a `Snapshot` or a `FetchError`. Retry policy,
//! transport details and provider rate limits stay behind this trait; the
//! tracking loop only paces its calls.

pub mod simulated;

use tracker_common::FetchError;

pub use simulated::SimulatedSource;

/// One fetched price observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// Latest traded price.
    pub price: f64,
    /// Change against the provider's previous close, in percent.
    pub change_percent: f64,
}

/// Provider of price snapshots.
pub trait QuoteSource {
    /// Provider name used in logs.
    fn provider(&self) -> &str;

    /// Current price of `symbol`.
    fn fetch(&mut self, symbol: &str) -> Result<Snapshot, FetchError>;
}

#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::{HashMap, VecDeque};

    use super::{QuoteSource, Snapshot};
    use tracker_common::FetchError;

    /// Replays queued answers per symbol; unknown symbols fail as invalid.
    #[derive(Default)]
    pub(crate) struct ScriptedSource {
        answers: HashMap<String, VecDeque<Result<Snapshot, FetchError>>>,
        pub(crate) calls: Vec<String>,
    }

    impl ScriptedSource {
        pub(crate) fn push(&mut self, symbol: &str, answer: Result<Snapshot, FetchError>) {
            self.answers.entry(symbol.to_string()).or_default().push_back(answer);
        }

        pub(crate) fn price(&mut self, symbol: &str, price: f64, change_percent: f64) {
            self.push(symbol, Ok(Snapshot { price, change_percent }));
        }
    }

    impl QuoteSource for ScriptedSource {
        fn provider(&self) -> &str {
            "scripted"
        }

        fn fetch(&mut self, symbol: &str) -> Result<Snapshot, FetchError> {
            self.calls.push(symbol.to_string());
            self.answers
                .get_mut(symbol)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Err(FetchError::InvalidSymbol(symbol.to_string())))
        }
    }
}
