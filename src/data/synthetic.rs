//! Seeded synthetic price histories. Used by tests and by the CLI's `--synthetic` mode.
//!
//! Every generator is a pure function of its arguments: the same seed yields the same bars.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::domain::Candle;
use crate::utils::TimeUtils;

/// 2024-01-02 00:00 UTC. First bar of every synthetic series.
pub const START_MS: i64 = 1_704_153_600_000;

/// Base intrabar range for noisy generators, as a fraction of price.
const RANGE_SPREAD: f64 = 0.002;
const BASE_VOLUME: f64 = 1_000_000.0;

/// The named shapes offered by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum SyntheticKind {
    /// Noise-free exponential growth, 0.3% per bar.
    Trend,
    /// Ornstein-Uhlenbeck around 100.
    Ou,
    /// Calm half followed by a turbulent half.
    Regime,
    /// Geometric Brownian motion with a mild upward drift.
    Gbm,
}

impl SyntheticKind {
    pub fn generate(self, bars: usize, seed: u64) -> Vec<Candle> {
        match self {
            SyntheticKind::Trend => constant_growth(bars, 100.0, 0.003),
            SyntheticKind::Ou => ornstein_uhlenbeck(bars, 100.0, 0.7, 1.0, seed),
            SyntheticKind::Regime => {
                let calm = bars / 2;
                regime_switch(&[(calm, 0.005), (bars - calm, 0.025)], 100.0, seed)
            }
            SyntheticKind::Gbm => geometric_brownian(bars, 100.0, 0.0004, 0.015, seed),
        }
    }
}

fn timestamp(i: usize) -> i64 {
    START_MS + i as i64 * TimeUtils::MS_IN_D
}

fn standard_normals(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| StandardNormal.sample(&mut rng)).collect()
}

/// Bars from a close path. Open is the previous close; the range widens by a seeded jitter.
fn candles_from_closes(closes: &[f64], seed: u64) -> Vec<Candle> {
    let jitter = standard_normals(closes.len(), seed.wrapping_add(0x5eed));
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let spread = RANGE_SPREAD * (0.5 + jitter[i].abs());
            Candle::new(
                timestamp(i),
                open,
                open.max(close) * (1.0 + spread),
                open.min(close) * (1.0 - spread),
                close,
                BASE_VOLUME * (1.0 + 0.1 * jitter[i].abs()),
            )
        })
        .collect()
}

/// I.i.d. `N(0, sigma^2)` samples.
pub fn white_noise(n: usize, sigma: f64, seed: u64) -> Vec<f64> {
    standard_normals(n, seed).into_iter().map(|z| sigma * z).collect()
}

/// Cumulative sum of `drift + sigma * z`, starting from the first step.
pub fn random_walk(n: usize, drift: f64, sigma: f64, seed: u64) -> Vec<f64> {
    standard_normals(n, seed)
        .into_iter()
        .scan(0.0, |level, z| {
            *level += drift + sigma * z;
            Some(*level)
        })
        .collect()
}

/// `close_i = start * (1 + rate)^i` with no intrabar range.
pub fn constant_growth(bars: usize, start: f64, rate: f64) -> Vec<Candle> {
    let closes: Vec<f64> = (0..bars).map(|i| start * (1.0 + rate).powi(i as i32)).collect();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::new(timestamp(i), open, open.max(close), open.min(close), close, BASE_VOLUME)
        })
        .collect()
}

/// Log-normal price path with per-bar `drift` and `vol`.
pub fn geometric_brownian(bars: usize, start: f64, drift: f64, vol: f64, seed: u64) -> Vec<Candle> {
    let shocks = standard_normals(bars, seed);
    let mut price = start;
    let closes: Vec<f64> = shocks
        .iter()
        .enumerate()
        .map(|(i, z)| {
            if i > 0 {
                price *= (drift - 0.5 * vol * vol + vol * z).exp();
            }
            price
        })
        .collect();
    candles_from_closes(&closes, seed)
}

/// Discrete Ornstein-Uhlenbeck: `x_{t+1} = x_t + theta * (mean - x_t) + sigma * z`.
///
/// Prices are floored at 1% of the mean so that large `sigma` cannot go non-positive.
pub fn ornstein_uhlenbeck(bars: usize, mean: f64, theta: f64, sigma: f64, seed: u64) -> Vec<Candle> {
    let shocks = standard_normals(bars, seed);
    let floor = mean.abs() * 0.01;
    let mut x = mean;
    let closes: Vec<f64> = shocks
        .iter()
        .enumerate()
        .map(|(i, z)| {
            if i > 0 {
                x = (x + theta * (mean - x) + sigma * z).max(floor);
            }
            x
        })
        .collect();
    candles_from_closes(&closes, seed)
}

/// Driftless log-normal segments `(bars, per-bar vol)` concatenated in order.
pub fn regime_switch(segments: &[(usize, f64)], start: f64, seed: u64) -> Vec<Candle> {
    let total: usize = segments.iter().map(|(bars, _)| bars).sum();
    let shocks = standard_normals(total, seed);
    let vols = segments
        .iter()
        .flat_map(|&(bars, vol)| std::iter::repeat_n(vol, bars));

    let mut price = start;
    let closes: Vec<f64> = shocks
        .iter()
        .zip(vols)
        .enumerate()
        .map(|(i, (z, vol))| {
            if i > 0 {
                price *= (vol * z - 0.5 * vol * vol).exp();
            }
            price
        })
        .collect();
    candles_from_closes(&closes, seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceSeries;
    use strum::IntoEnumIterator;

    #[test]
    fn generators_are_reproducible() {
        assert_eq!(white_noise(50, 1.0, 7), white_noise(50, 1.0, 7));
        assert_ne!(white_noise(50, 1.0, 7), white_noise(50, 1.0, 8));
        assert_eq!(
            geometric_brownian(30, 100.0, 0.0, 0.01, 1),
            geometric_brownian(30, 100.0, 0.0, 0.01, 1)
        );
    }

    #[test]
    fn every_kind_builds_a_valid_series() {
        for kind in SyntheticKind::iter() {
            let candles = kind.generate(120, 42);
            assert_eq!(candles.len(), 120);
            assert!(candles.iter().all(Candle::is_consistent), "{}", kind);
            assert!(PriceSeries::from_candles(kind.to_string(), &candles).is_ok());
        }
        assert_eq!("ou".parse::<SyntheticKind>().unwrap(), SyntheticKind::Ou);
    }

    #[test]
    fn constant_growth_compounds() {
        let candles = constant_growth(3, 100.0, 0.01);
        assert_eq!(candles[0].close_price, 100.0);
        assert!((candles[2].close_price - 102.01).abs() < 1e-9);
        assert_eq!(candles[1].open_price, candles[0].close_price);
        assert_eq!(candles[1].timestamp_ms - candles[0].timestamp_ms, TimeUtils::MS_IN_D);
    }

    #[test]
    fn regime_switch_concatenates_segments() {
        let candles = regime_switch(&[(10, 0.01), (15, 0.05)], 50.0, 3);
        assert_eq!(candles.len(), 25);
        assert_eq!(candles[0].close_price, 50.0);
    }
}
