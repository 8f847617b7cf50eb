//! Descriptive statistics for the record's `metrics` map and the synthesizer's momentum input.

use std::collections::BTreeMap;

use crate::config::{AnalysisConfig, MomentumConfig};
use crate::models::{Momentum, PriceSeries, RealizedVolatility, SignalProcessingResult};
use crate::utils::{is_effectively_constant, linear_fit, mean_and_stddev};

/// Annualised Sharpe ratio of per-bar returns (zero risk-free rate).
///
/// A return stream with no dispersion saturates at `±cap` instead of dividing by zero.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64, cap: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let (mean, std) = mean_and_stddev(returns);
    if std <= 1e-12 * mean.abs() || std < 1e-15 {
        return if mean == 0.0 { 0.0 } else { mean.signum() * cap };
    }
    (mean / std * periods_per_year.sqrt()).clamp(-cap, cap)
}

/// Largest peak-to-trough decline as a positive fraction.
pub fn max_drawdown(prices: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &p in prices {
        peak = peak.max(p);
        if peak > 0.0 {
            worst = worst.max((peak - p) / peak);
        }
    }
    worst
}

/// Population skewness. Zero for a constant sample.
pub fn skewness(data: &[f64]) -> f64 {
    let (mean, std) = mean_and_stddev(data);
    if data.len() < 3 || std < 1e-14 {
        return 0.0;
    }
    data.iter().map(|x| ((x - mean) / std).powi(3)).sum::<f64>() / data.len() as f64
}

/// Excess kurtosis (normal = 0).
pub fn excess_kurtosis(data: &[f64]) -> f64 {
    let (mean, std) = mean_and_stddev(data);
    if data.len() < 4 || std < 1e-14 {
        return 0.0;
    }
    data.iter().map(|x| ((x - mean) / std).powi(4)).sum::<f64>() / data.len() as f64 - 3.0
}

/// Ornstein-Uhlenbeck half-life in bars from regressing `Δp` on `p`.
/// Only defined when the slope is negative (mean-reverting).
pub fn ou_half_life(prices: &[f64]) -> Option<f64> {
    if prices.len() < 3 || is_effectively_constant(prices) {
        return None;
    }
    let lagged = &prices[..prices.len() - 1];
    let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let (slope, _) = linear_fit(lagged, &deltas)?;
    if slope >= 0.0 || slope <= -1.0 {
        return None;
    }
    let half_life = -(2.0_f64.ln()) / (1.0 + slope).ln();
    half_life.is_finite().then_some(half_life)
}

/// Recent price momentum. `None` until the series covers `window + 1` bars.
pub fn momentum(series: &PriceSeries, config: &MomentumConfig, periods_per_year: f64) -> Option<Momentum> {
    let closes = series.closes();
    let n = closes.len();
    if config.window == 0 || n < config.window + 1 {
        return None;
    }
    let last = closes[n - 1];
    let anchor = closes[n - 1 - config.window];
    let window_return = last / anchor - 1.0;

    let recent = &closes[n - config.window..];
    let (mean, std) = mean_and_stddev(recent);
    let zscore = if std < 1e-12 * mean.abs().max(1.0) {
        0.0
    } else {
        (last - mean) / std
    };

    Some(Momentum {
        window_return,
        zscore,
        sharpe: sharpe_ratio(&series.log_returns(), periods_per_year, config.sharpe_cap),
        last_change: last / closes[n - 2] - 1.0,
    })
}

/// Assemble the record's flat metrics map.
pub fn build_metrics(
    series: &PriceSeries,
    config: &AnalysisConfig,
    momentum: Option<&Momentum>,
    realized: Option<&RealizedVolatility>,
    spectral: Option<&SignalProcessingResult>,
) -> BTreeMap<String, f64> {
    let returns = series.log_returns();
    let mut metrics = BTreeMap::new();

    metrics.insert(
        "sharpe_ratio".to_string(),
        sharpe_ratio(&returns, config.periods_per_year, config.momentum.sharpe_cap),
    );
    metrics.insert("max_drawdown".to_string(), max_drawdown(series.closes()));
    metrics.insert("skewness".to_string(), skewness(&returns));
    metrics.insert("kurtosis".to_string(), excess_kurtosis(&returns));

    if let Some(m) = momentum {
        metrics.insert("momentum_return".to_string(), m.window_return);
        metrics.insert("momentum_zscore".to_string(), m.zscore);
    }
    if let Some(half_life) = ou_half_life(series.closes()) {
        metrics.insert("ou_half_life".to_string(), half_life);
    }
    if let Some(rv) = realized {
        let estimators = [
            ("realized_vol_close", rv.close_to_close),
            ("realized_vol_parkinson", rv.parkinson),
            ("realized_vol_garman_klass", rv.garman_klass),
        ];
        for (key, value) in estimators {
            if let Some(v) = value {
                metrics.insert(key.to_string(), v);
            }
        }
    }
    if let Some(sp) = spectral {
        metrics.insert("hurst_exponent".to_string(), sp.hurst_exponent);
        if let Some(period) = sp.dominant_period {
            metrics.insert("dominant_period_days".to_string(), period);
        }
    }

    metrics.retain(|_, v| v.is_finite());
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ANALYSIS;
    use crate::data::synthetic;

    #[test]
    fn drawdown_tracks_the_running_peak() {
        let prices = [100.0, 120.0, 90.0, 130.0, 117.0];
        assert!((max_drawdown(&prices) - 0.25).abs() < 1e-12);
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn sharpe_saturates_on_riskless_growth() {
        let returns = vec![0.003; 100];
        assert_eq!(sharpe_ratio(&returns, 252.0, 10.0), 10.0);
        let falling = vec![-0.003; 100];
        assert_eq!(sharpe_ratio(&falling, 252.0, 10.0), -10.0);
        assert_eq!(sharpe_ratio(&[0.0; 10], 252.0, 10.0), 0.0);
    }

    #[test]
    fn symmetric_sample_has_no_skew() {
        let data = [-2.0, -1.0, 0.0, 1.0, 2.0];
        assert!(skewness(&data).abs() < 1e-12);
        // Uniform-like samples are platykurtic.
        assert!(excess_kurtosis(&data) < 0.0);
    }

    #[test]
    fn half_life_only_for_mean_reverting_prices() {
        let ou: Vec<f64> = synthetic::ornstein_uhlenbeck(500, 100.0, 0.2, 1.0, 3)
            .iter()
            .map(|c| c.close_price)
            .collect();
        let half_life = ou_half_life(&ou).unwrap();
        assert!(half_life > 1.0 && half_life < 10.0, "half-life {}", half_life);

        let growth: Vec<f64> = (0..100).map(|i| 100.0 * 1.01_f64.powi(i)).collect();
        assert!(ou_half_life(&growth).is_none());
    }

    #[test]
    fn momentum_needs_window_plus_one_bars() {
        let candles = synthetic::constant_growth(21, 100.0, 0.01);
        let series = PriceSeries::from_candles("T", &candles).unwrap();
        let m = momentum(&series, &ANALYSIS.momentum, 252.0).unwrap();
        assert!((m.window_return - (1.01_f64.powi(20) - 1.0)).abs() < 1e-9);
        assert!(m.zscore > 1.0);
        assert!((m.last_change - 0.01).abs() < 1e-9);

        let short = series.most_recent(20);
        assert!(momentum(&short, &ANALYSIS.momentum, 252.0).is_none());
    }

    #[test]
    fn metrics_map_has_core_keys() {
        let candles = synthetic::geometric_brownian(200, 50.0, 0.0002, 0.01, 9);
        let series = PriceSeries::from_candles("T", &candles).unwrap();
        let metrics = build_metrics(&series, &ANALYSIS, None, None, None);
        for key in ["sharpe_ratio", "max_drawdown", "skewness", "kurtosis"] {
            assert!(metrics.contains_key(key), "missing {}", key);
        }
        assert!(!metrics.contains_key("hurst_exponent"));
    }
}
