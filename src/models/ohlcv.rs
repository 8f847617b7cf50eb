use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::Candle;
use crate::error::SeriesError;
use crate::utils::{epoch_ms_to_date, log_returns};

/// Validated daily OHLCV history, oldest first. Structure-of-arrays layout.
///
/// Timestamps are strictly increasing. Gaps are left as-is. Once built the series is
/// never mutated; the engine shares it between analyzer tasks behind an `Arc`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub symbol: String,
    timestamps: Vec<i64>,
    open_prices: Vec<f64>,
    high_prices: Vec<f64>,
    low_prices: Vec<f64>,
    close_prices: Vec<f64>,
    volumes: Vec<f64>,
}

impl PriceSeries {
    pub fn from_candles(symbol: impl Into<String>, candles: &[Candle]) -> Result<Self, SeriesError> {
        if candles.is_empty() {
            return Err(SeriesError::Empty);
        }

        for (index, pair) in candles.windows(2).enumerate() {
            if pair[1].timestamp_ms <= pair[0].timestamp_ms {
                return Err(SeriesError::NonIncreasingTimestamp {
                    index: index + 1,
                    previous: pair[0].timestamp_ms,
                    current: pair[1].timestamp_ms,
                });
            }
        }

        for (index, c) in candles.iter().enumerate() {
            let prices = [c.open_price, c.high_price, c.low_price, c.close_price];
            if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
                return Err(SeriesError::InvalidPrice { index });
            }
            if !c.is_consistent() {
                return Err(SeriesError::InconsistentRange { index });
            }
        }

        let n = candles.len();
        let mut series = Self {
            symbol: symbol.into(),
            timestamps: Vec::with_capacity(n),
            open_prices: Vec::with_capacity(n),
            high_prices: Vec::with_capacity(n),
            low_prices: Vec::with_capacity(n),
            close_prices: Vec::with_capacity(n),
            volumes: Vec::with_capacity(n),
        };
        for c in candles {
            series.timestamps.push(c.timestamp_ms);
            series.open_prices.push(c.open_price);
            series.high_prices.push(c.high_price);
            series.low_prices.push(c.low_price);
            series.close_prices.push(c.close_price);
            series.volumes.push(c.volume);
        }
        Ok(series)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn opens(&self) -> &[f64] {
        &self.open_prices
    }

    pub fn highs(&self) -> &[f64] {
        &self.high_prices
    }

    pub fn lows(&self) -> &[f64] {
        &self.low_prices
    }

    pub fn closes(&self) -> &[f64] {
        &self.close_prices
    }

    pub fn last_timestamp_ms(&self) -> i64 {
        self.timestamps.last().copied().unwrap_or_default()
    }

    /// Calendar date of the newest bar. Part of the cache key.
    pub fn as_of_date(&self) -> Option<NaiveDate> {
        self.timestamps.last().and_then(|ts| epoch_ms_to_date(*ts))
    }

    pub fn current_price(&self) -> f64 {
        self.close_prices.last().copied().unwrap_or(f64::NAN)
    }

    /// Percentage change from the first to the last close.
    pub fn price_change_pct(&self) -> f64 {
        match (self.close_prices.first(), self.close_prices.last()) {
            (Some(first), Some(last)) => (last / first - 1.0) * 100.0,
            _ => 0.0,
        }
    }

    /// Log returns of the close series. Recomputed on every call, never cached.
    pub fn log_returns(&self) -> Vec<f64> {
        log_returns(&self.close_prices)
    }

    /// Keep only the most recent `bars` bars.
    pub fn most_recent(mut self, bars: usize) -> Self {
        let n = self.len();
        if bars < n {
            let cut = n - bars;
            self.timestamps.drain(..cut);
            self.open_prices.drain(..cut);
            self.high_prices.drain(..cut);
            self.low_prices.drain(..cut);
            self.close_prices.drain(..cut);
            self.volumes.drain(..cut);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| Candle::flat(i as i64 * 86_400_000, *c, 1.0))
            .collect()
    }

    #[test]
    fn builds_from_ordered_candles() {
        let series = PriceSeries::from_candles("ABC", &bars(&[10.0, 11.0, 12.1])).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.log_returns().len(), 2);
        assert!((series.price_change_pct() - 21.0).abs() < 1e-9);
        assert_eq!(series.current_price(), 12.1);
    }

    #[test]
    fn rejects_duplicate_or_decreasing_timestamps() {
        let mut candles = bars(&[10.0, 11.0, 12.0]);
        candles[2].timestamp_ms = candles[1].timestamp_ms;
        let err = PriceSeries::from_candles("ABC", &candles).unwrap_err();
        assert!(matches!(err, SeriesError::NonIncreasingTimestamp { index: 2, .. }));
    }

    #[test]
    fn rejects_bad_prices_and_empty_input() {
        assert_eq!(
            PriceSeries::from_candles("ABC", &bars(&[10.0, -1.0])).unwrap_err(),
            SeriesError::InvalidPrice { index: 1 }
        );
        let mut candles = bars(&[10.0, 11.0]);
        candles[0].high_price = 9.0;
        assert_eq!(
            PriceSeries::from_candles("ABC", &candles).unwrap_err(),
            SeriesError::InconsistentRange { index: 0 }
        );
        assert_eq!(PriceSeries::from_candles("ABC", &[]).unwrap_err(), SeriesError::Empty);
    }

    #[test]
    fn most_recent_keeps_the_tail() {
        let series = PriceSeries::from_candles("ABC", &bars(&[1.0, 2.0, 3.0, 4.0]))
            .unwrap()
            .most_recent(2);
        assert_eq!(series.closes(), &[3.0, 4.0]);
        assert_eq!(series.timestamps()[0], 2 * 86_400_000);
        assert_eq!(series.as_of_date().unwrap().to_string(), "1970-01-04");
    }
}
