//! Append-only journal store.
//!
//! Price records and alerts are appended as one JSON object per line to
//! `prices.jsonl` and `alerts.jsonl` under the data directory, and replayed
//! into a `MemoryRepository` on open, which then serves every read. The files
//! keep everything; the in-memory side keeps the newest `retention` rows of
//! each. Stock rows are not journaled: the registry recreates them from the
//! watch-list at startup.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracker_common::{Alert, PriceRecord, Stock, StoreError};

use super::{MemoryRepository, Repository};

/// Journal of price records inside the data directory.
pub const PRICES_FILE: &str = "prices.jsonl";
/// Journal of triggered alerts inside the data directory.
pub const ALERTS_FILE: &str = "alerts.jsonl";

/// Repository that survives restarts for price history and alerts.
pub struct JournalRepository {
    memory: MemoryRepository,
    prices: Mutex<File>,
    alerts: Mutex<File>,
}

impl JournalRepository {
    /// Create `dir` if needed, replay existing journals and open them for appending.
    pub fn open(dir: impl AsRef<Path>, retention: usize) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let memory = MemoryRepository::with_retention(retention);
        let prices_path = dir.join(PRICES_FILE);
        let alerts_path = dir.join(ALERTS_FILE);
        let prices = replay(&prices_path, |record: PriceRecord| memory.save_price(&record))?;
        let alerts = replay(&alerts_path, |alert: Alert| memory.save_alert(&alert))?;
        info!(
            "Journal opened at {}: replayed {} prices, {} alerts",
            dir.display(),
            prices,
            alerts
        );

        Ok(Self {
            memory,
            prices: Mutex::new(open_append(&prices_path)?),
            alerts: Mutex::new(open_append(&alerts_path)?),
        })
    }
}

fn open_append(path: &Path) -> Result<File, StoreError> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn replay<T: DeserializeOwned>(
    path: &Path,
    mut apply: impl FnMut(T) -> Result<(), StoreError>,
) -> Result<usize, StoreError> {
    if !path.exists() {
        return Ok(0);
    }
    let reader = BufReader::new(File::open(path)?);
    let mut replayed = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(value) => {
                apply(value)?;
                replayed += 1;
            }
            Err(e) => warn!(
                "Skipping malformed journal line {}:{}: {}",
                path.display(),
                index + 1,
                e
            ),
        }
    }
    Ok(replayed)
}

fn append<T: Serialize>(file: &Mutex<File>, value: &T) -> Result<(), StoreError> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
    file.write_all(line.as_bytes())?;
    file.flush()?;
    Ok(())
}

impl Repository for JournalRepository {
    fn create_stock(&self, stock: &Stock) -> Result<(), StoreError> {
        self.memory.create_stock(stock)
    }

    fn update_stock(&self, stock: &Stock) -> Result<(), StoreError> {
        self.memory.update_stock(stock)
    }

    fn get_stock(&self, symbol: &str) -> Result<Stock, StoreError> {
        self.memory.get_stock(symbol)
    }

    fn list_stocks(&self) -> Result<Vec<Stock>, StoreError> {
        self.memory.list_stocks()
    }

    fn delete_stock(&self, symbol: &str) -> Result<(), StoreError> {
        self.memory.delete_stock(symbol)
    }

    fn save_price(&self, record: &PriceRecord) -> Result<(), StoreError> {
        append(&self.prices, record)?;
        self.memory.save_price(record)
    }

    fn price_history(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PriceRecord>, StoreError> {
        self.memory.price_history(symbol, from, to, limit)
    }

    fn save_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        append(&self.alerts, alert)?;
        self.memory.save_alert(alert)
    }

    fn alerts(&self, symbol: &str, limit: usize) -> Result<Vec<Alert>, StoreError> {
        self.memory.alerts(symbol, limit)
    }

    fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        self.memory.recent_alerts(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DEFAULT_RETENTION;
    use chrono::Duration;
    use tempfile::TempDir;
    use tracker_common::AlertType;

    fn price(symbol: &str, price: f64, timestamp: DateTime<Utc>) -> PriceRecord {
        PriceRecord {
            symbol: symbol.into(),
            price,
            change_percent: 0.0,
            timestamp,
        }
    }

    #[test]
    fn records_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("data");
        let now = Utc::now();
        {
            let repo = JournalRepository::open(&dir, DEFAULT_RETENTION).unwrap();
            repo.save_price(&PriceRecord {
                symbol: "AAPL".into(),
                price: 159.0,
                change_percent: 6.0,
                timestamp: now,
            })
            .unwrap();
            repo.save_alert(&Alert {
                symbol: "AAPL".into(),
                alert_type: AlertType::Increase,
                threshold: 5.0,
                message: "AAPL changed by 6.00% (from $150.00 to $159.00)".into(),
                triggered_at: now,
            })
            .unwrap();
        }

        let reopened = JournalRepository::open(&dir, DEFAULT_RETENTION).unwrap();
        let history = reopened
            .price_history("AAPL", now - Duration::minutes(1), now + Duration::minutes(1), 10)
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].price, 159.0);
        assert_eq!(reopened.recent_alerts(10).unwrap().len(), 1);
    }

    #[test]
    fn malformed_lines_are_skipped_on_replay() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        let good = serde_json::to_string(&PriceRecord {
            symbol: "MSFT".into(),
            price: 410.0,
            change_percent: 0.2,
            timestamp: Utc::now(),
        })
        .unwrap();
        fs::write(dir.join(PRICES_FILE), format!("{{not json\n{good}\n\n")).unwrap();

        let repo = JournalRepository::open(dir, DEFAULT_RETENTION).unwrap();
        let history = repo
            .price_history("MSFT", Utc::now() - Duration::hours(1), Utc::now(), 10)
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn replay_keeps_only_the_newest_rows_in_memory() {
        let tmp = TempDir::new().unwrap();
        let start = Utc::now() - Duration::minutes(10);
        {
            let repo = JournalRepository::open(tmp.path(), 100).unwrap();
            for n in 0..5 {
                repo.save_price(&price("TSLA", 200.0 + n as f64, start + Duration::minutes(n)))
                    .unwrap();
            }
        }

        let reopened = JournalRepository::open(tmp.path(), 2).unwrap();
        let history = reopened
            .price_history("TSLA", start, Utc::now(), 10)
            .unwrap();
        let prices: Vec<f64> = history.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![204.0, 203.0]);
        let on_disk = fs::read_to_string(tmp.path().join(PRICES_FILE)).unwrap();
        assert_eq!(on_disk.lines().count(), 5);
    }
}
