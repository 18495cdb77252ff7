//! Random-walk quote source.
//!
//! Each symbol opens at a deterministic price derived from its name and then
//! moves by a uniformly sampled step in `[-volatility, +volatility]` per
//! fetch. `change_percent` is reported against the opening price, the way a
//! real provider reports the day's change. A configurable failure rate makes
//! the source fail with `FetchError::Network`, which is enough to exercise
//! the tracking loop's error path end to end.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracker_common::FetchError;
use tracker_common::symbols::is_valid_symbol;

use super::{QuoteSource, Snapshot};

struct Session {
    open: f64,
    last: f64,
}

/// Synthetic provider used when no real market feed is configured.
pub struct SimulatedSource {
    rng: StdRng,
    volatility: f64,
    failure_rate: f64,
    sessions: HashMap<String, Session>,
}

impl SimulatedSource {
    /// `volatility` is the largest relative move per fetch (0.02 = 2%),
    /// `failure_rate` the probability of a simulated network failure.
    pub fn new(volatility: f64, failure_rate: f64) -> Self {
        Self::from_rng(StdRng::from_os_rng(), volatility, failure_rate)
    }

    /// Reproducible source for a given seed.
    pub fn with_seed(seed: u64, volatility: f64, failure_rate: f64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed), volatility, failure_rate)
    }

    fn from_rng(rng: StdRng, volatility: f64, failure_rate: f64) -> Self {
        Self {
            rng,
            volatility: volatility.abs(),
            failure_rate: failure_rate.clamp(0.0, 1.0),
            sessions: HashMap::new(),
        }
    }

    /// Opening price in `[20, 500)` derived from the symbol's bytes.
    pub fn opening_price(symbol: &str) -> f64 {
        let hash = symbol
            .bytes()
            .fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        20.0 + (hash % 48_000) as f64 / 100.0
    }
}

/// Next price of a small random walk around `current_price`, clamped to stay positive.
fn next_price(rng: &mut impl Rng, current_price: f64, volatility: f64) -> f64 {
    let change: f64 = rng.random_range(-volatility..=volatility);
    let new_price = current_price * (1.0 + change);
    new_price.max(0.01)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

impl QuoteSource for SimulatedSource {
    fn provider(&self) -> &str {
        "simulated"
    }

    fn fetch(&mut self, symbol: &str) -> Result<Snapshot, FetchError> {
        if !is_valid_symbol(symbol) {
            return Err(FetchError::InvalidSymbol(symbol.to_string()));
        }
        if self.failure_rate > 0.0 && self.rng.random_bool(self.failure_rate) {
            return Err(FetchError::Network("simulated upstream timeout".to_string()));
        }

        let session = self.sessions.entry(symbol.to_string()).or_insert_with(|| {
            let open = Self::opening_price(symbol);
            Session { open, last: open }
        });
        session.last = round4(next_price(&mut self.rng, session.last, self.volatility));

        Ok(Snapshot {
            price: session.last,
            change_percent: round4((session.last - session.open) / session.open * 100.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_price_is_stable_and_in_range() {
        let open = SimulatedSource::opening_price("AAPL");
        assert_eq!(open, SimulatedSource::opening_price("AAPL"));
        assert!((20.0..500.0).contains(&open));
    }

    #[test]
    fn steps_stay_within_volatility() {
        let mut source = SimulatedSource::with_seed(7, 0.02, 0.0);
        let mut last = SimulatedSource::opening_price("MSFT");
        for _ in 0..200 {
            let snapshot = source.fetch("MSFT").unwrap();
            let step = (snapshot.price - last) / last;
            assert!(step.abs() <= 0.0201, "step {step} exceeds volatility");
            assert!(snapshot.price > 0.0);
            last = snapshot.price;
        }
    }

    #[test]
    fn change_percent_is_relative_to_open() {
        let mut source = SimulatedSource::with_seed(11, 0.05, 0.0);
        let open = SimulatedSource::opening_price("TSLA");
        let snapshot = source.fetch("TSLA").unwrap();
        let expected = (snapshot.price - open) / open * 100.0;
        assert!((snapshot.change_percent - expected).abs() < 0.001);
    }

    #[test]
    fn same_seed_same_walk() {
        let mut a = SimulatedSource::with_seed(42, 0.03, 0.0);
        let mut b = SimulatedSource::with_seed(42, 0.03, 0.0);
        for _ in 0..10 {
            assert_eq!(a.fetch("GOOGL"), b.fetch("GOOGL"));
        }
    }

    #[test]
    fn zero_volatility_holds_price() {
        let mut source = SimulatedSource::with_seed(1, 0.0, 0.0);
        let open = SimulatedSource::opening_price("NVDA");
        let snapshot = source.fetch("NVDA").unwrap();
        assert_eq!(snapshot.price, round4(open));
        assert_eq!(snapshot.change_percent, 0.0);
    }

    #[test]
    fn invalid_symbol_and_forced_failure() {
        let mut source = SimulatedSource::with_seed(3, 0.01, 1.0);
        assert_eq!(
            source.fetch("bad symbol"),
            Err(FetchError::InvalidSymbol("bad symbol".to_string()))
        );
        assert!(matches!(source.fetch("AAPL"), Err(FetchError::Network(_))));
    }
}
