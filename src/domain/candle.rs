use serde::{Deserialize, Serialize};

/// One daily OHLCV bar as handed over by a data provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp_ms: i64,

    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,

    pub volume: f64,
}

impl Candle {
    // A constructor for convenience
    pub fn new(timestamp_ms: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Candle {
            timestamp_ms,
            open_price: open,
            high_price: high,
            low_price: low,
            close_price: close,
            volume,
        }
    }

    /// A bar whose open, high, low and close all equal `price`.
    pub fn flat(timestamp_ms: i64, price: f64, volume: f64) -> Self {
        Self::new(timestamp_ms, price, price, price, price, volume)
    }

    /// `low <= open, close <= high`, with every price positive and finite.
    pub fn is_consistent(&self) -> bool {
        let prices = [self.open_price, self.high_price, self.low_price, self.close_price];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return false;
        }
        let body_low = self.open_price.min(self.close_price);
        let body_high = self.open_price.max(self.close_price);
        self.low_price <= body_low && body_high <= self.high_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_checks_range_and_sign() {
        assert!(Candle::new(0, 10.0, 11.0, 9.5, 10.5, 1.0).is_consistent());
        assert!(!Candle::new(0, 10.0, 10.2, 9.5, 10.5, 1.0).is_consistent());
        assert!(!Candle::flat(0, 0.0, 1.0).is_consistent());
        assert!(!Candle::flat(0, f64::NAN, 1.0).is_consistent());
    }
}
