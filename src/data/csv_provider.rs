use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::provider::{MarketDataProvider, tail};
use crate::domain::Candle;
use crate::error::ProviderError;
use crate::utils::TimeUtils;

/// One row of `<SYMBOL>.csv`. `timestamp` is epoch milliseconds or a `YYYY-MM-DD` date.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CsvBar {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl CsvBar {
    fn timestamp_ms(&self) -> Option<i64> {
        let raw = self.timestamp.trim();
        raw.parse::<i64>().ok().or_else(|| {
            NaiveDate::parse_from_str(raw, TimeUtils::STANDARD_TIME_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc().timestamp_millis())
        })
    }
}

/// Reads one CSV file per instrument from a directory.
#[derive(Debug, Clone)]
pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol))
    }
}

/// Parse every row; a malformed file makes the provider unavailable for that symbol.
pub fn read_candles(path: &Path) -> Result<Vec<Candle>, ProviderError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| ProviderError::Unavailable(format!("opening {}: {}", path.display(), e)))?;

    reader
        .deserialize::<CsvBar>()
        .enumerate()
        .map(|(row, record)| {
            let bar = record.map_err(|e| {
                ProviderError::Unavailable(format!("{} row {}: {}", path.display(), row + 1, e))
            })?;
            let timestamp_ms = bar.timestamp_ms().ok_or_else(|| {
                ProviderError::Unavailable(format!(
                    "{} row {}: unreadable timestamp '{}'",
                    path.display(),
                    row + 1,
                    bar.timestamp
                ))
            })?;
            Ok(Candle::new(timestamp_ms, bar.open, bar.high, bar.low, bar.close, bar.volume))
        })
        .collect()
}

/// Write candles in the layout `read_candles` accepts.
pub fn write_candles(path: &Path, candles: &[Candle]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for c in candles {
        writer.serialize(CsvBar {
            timestamp: c.timestamp_ms.to_string(),
            open: c.open_price,
            high: c.high_price,
            low: c.low_price,
            close: c.close_price,
            volume: c.volume,
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[async_trait]
impl MarketDataProvider for CsvProvider {
    async fn fetch_candles(&self, symbol: &str, lookback_days: usize) -> Result<Vec<Candle>, ProviderError> {
        let path = self.path_for(symbol);
        if !path.is_file() {
            return Err(ProviderError::SymbolNotFound(symbol.to_string()));
        }
        let candles = tokio::task::spawn_blocking(move || read_candles(&path))
            .await
            .map_err(|e| ProviderError::Unavailable(format!("reader task failed: {}", e)))??;
        log::debug!("Loaded {} bars for {} from CSV", candles.len(), symbol);
        Ok(tail(candles, lookback_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("quant-engine-csv-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn round_trips_through_a_directory() {
        let dir = scratch_dir("roundtrip");
        let candles = synthetic::geometric_brownian(40, 100.0, 0.0, 0.01, 4);
        write_candles(&dir.join("ABC.csv"), &candles).unwrap();

        let provider = CsvProvider::new(&dir);
        let got = provider.fetch_candles("ABC", 25).await.unwrap();
        assert_eq!(got.len(), 25);
        assert_eq!(got[24].timestamp_ms, candles[39].timestamp_ms);
        assert!((got[24].close_price - candles[39].close_price).abs() < 1e-9);

        assert_eq!(
            provider.fetch_candles("MISSING", 25).await,
            Err(ProviderError::SymbolNotFound("MISSING".into()))
        );
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn accepts_calendar_dates_and_rejects_garbage() {
        let dir = scratch_dir("dates");
        let good = dir.join("D.csv");
        std::fs::write(
            &good,
            "timestamp,open,high,low,close,volume\n2024-01-02,10,11,9,10.5,100\n",
        )
        .unwrap();
        let candles = read_candles(&good).unwrap();
        assert_eq!(candles[0].timestamp_ms, synthetic::START_MS);

        let bad = dir.join("B.csv");
        std::fs::write(&bad, "timestamp,open,high,low,close,volume\nyesterday,1,1,1,1,1\n").unwrap();
        assert!(matches!(read_candles(&bad), Err(ProviderError::Unavailable(_))));
        std::fs::remove_dir_all(dir).ok();
    }
}
