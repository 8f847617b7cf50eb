//! Analysis and computation configuration

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::config::constants::{self, eigen, fractional, momentum, regime, spectral, stationarity, volatility};
use crate::config::types::Prob;

/// Which series a stationarity-sensitive analyzer consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
pub enum SeriesInput {
    #[default]
    Raw,
    /// The fractionally differenced series, when the differentiator succeeded.
    Fractional,
}

/// Conditional-volatility model. Caller-selected, never auto-selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum VolatilityModel {
    #[default]
    #[strum(serialize = "garch")]
    Garch,
    #[strum(serialize = "gjr-garch")]
    GjrGarch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationarityConfig {
    /// ADF p-value below which a series counts as stationary.
    pub significance: Prob,
    pub kpss_significance: Prob,
    pub min_length: usize,
    /// Run KPSS as a cross-check alongside ADF.
    pub run_kpss: bool,
    /// Upper bound for the ADF lag search. `None` uses the Schwert rule.
    pub max_lag: Option<usize>,
    pub input: SeriesInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FractionalConfig {
    pub step: f64,
    pub max_order: f64,
    pub weight_threshold: f64,
    pub max_window_fraction: f64,
    pub min_length: usize,
    pub tail_len: usize,
}

/// Text mapping for the Hurst exponent. Tunable without code changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HurstInterpretation {
    pub mean_reverting_below: f64,
    pub trending_above: f64,
    pub mean_reverting: Cow<'static, str>,
    pub random_walk: Cow<'static, str>,
    pub trending: Cow<'static, str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    pub min_window: usize,
    pub window_count: usize,
    pub min_window_span: usize,
    /// Wavelet-denoise returns before the Hurst and FFT passes.
    pub denoise: bool,
    pub wavelet_levels: usize,
    pub input: SeriesInput,
    pub interpretation: HurstInterpretation,
    pub tail_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    pub model: VolatilityModel,
    pub horizon: usize,
    pub realized_window: usize,
    pub min_returns: usize,
    pub max_iter: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Largest state count. Counts from `min_states` up to this are compared by BIC.
    pub n_states: usize,
    pub min_states: usize,
    pub min_returns: usize,
    pub max_iter: usize,
    pub tolerance: f64,
    pub variance_floor_ratio: f64,
    /// Per-bar mean return (percent) inside which a state is labelled sideways.
    pub mean_dead_band: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    pub window: usize,
    pub sharpe_cap: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EigenConfig {
    pub min_observations: usize,
    pub s_score_window: usize,
}

/// The Master Analysis Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Annualisation factor, 252 for daily bars.
    pub periods_per_year: f64,
    pub stationarity: StationarityConfig,
    pub fractional: FractionalConfig,
    pub spectral: SpectralConfig,
    pub volatility: VolatilityConfig,
    pub regime: RegimeConfig,
    pub momentum: MomentumConfig,
    pub eigen: EigenConfig,
}

pub const ANALYSIS: AnalysisConfig = AnalysisConfig {
    periods_per_year: constants::TRADING_PERIODS_PER_YEAR,
    stationarity: StationarityConfig {
        significance: Prob::new(stationarity::SIGNIFICANCE),
        kpss_significance: Prob::new(stationarity::KPSS_SIGNIFICANCE),
        min_length: stationarity::MIN_LENGTH,
        run_kpss: true,
        max_lag: None,
        input: SeriesInput::Raw,
    },
    fractional: FractionalConfig {
        step: fractional::STEP,
        max_order: fractional::MAX_ORDER,
        weight_threshold: fractional::WEIGHT_THRESHOLD,
        max_window_fraction: fractional::MAX_WINDOW_FRACTION,
        min_length: fractional::MIN_LENGTH,
        tail_len: constants::SERIES_TAIL_LEN,
    },
    spectral: SpectralConfig {
        min_window: spectral::MIN_HURST_WINDOW,
        window_count: spectral::HURST_WINDOW_COUNT,
        min_window_span: spectral::MIN_WINDOW_SPAN,
        denoise: false,
        wavelet_levels: spectral::WAVELET_LEVELS,
        input: SeriesInput::Raw,
        interpretation: HurstInterpretation {
            mean_reverting_below: 0.45,
            trending_above: 0.55,
            mean_reverting: Cow::Borrowed("Mean-reverting"),
            random_walk: Cow::Borrowed("Random walk"),
            trending: Cow::Borrowed("Trending"),
        },
        tail_len: constants::SERIES_TAIL_LEN,
    },
    volatility: VolatilityConfig {
        model: VolatilityModel::Garch,
        horizon: volatility::FORECAST_HORIZON,
        realized_window: volatility::REALIZED_WINDOW,
        min_returns: volatility::MIN_RETURNS,
        max_iter: volatility::MAX_OPTIMIZER_ITER,
    },
    regime: RegimeConfig {
        n_states: regime::N_STATES,
        min_states: regime::MIN_STATES,
        min_returns: regime::MIN_RETURNS,
        max_iter: regime::MAX_ITER,
        tolerance: regime::TOLERANCE,
        variance_floor_ratio: regime::VARIANCE_FLOOR_RATIO,
        mean_dead_band: regime::MEAN_DEAD_BAND,
    },
    momentum: MomentumConfig {
        window: momentum::WINDOW,
        sharpe_cap: momentum::SHARPE_CAP,
    },
    eigen: EigenConfig {
        min_observations: eigen::MIN_OBSERVATIONS,
        s_score_window: eigen::S_SCORE_WINDOW,
    },
};

impl FractionalConfig {
    /// Candidate orders `0, step, 2*step, ..` up to `max_order` inclusive.
    pub fn orders(&self) -> Vec<f64> {
        let step = self.step.max(1e-3);
        let count = (self.max_order / step + 1e-9).floor() as usize;
        // Multiply rather than accumulate so each order is reproducible.
        (0..=count).map(|i| (i as f64 * step).min(self.max_order)).collect()
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        ANALYSIS
    }
}

impl Default for StationarityConfig {
    fn default() -> Self {
        ANALYSIS.stationarity
    }
}

impl Default for FractionalConfig {
    fn default() -> Self {
        ANALYSIS.fractional
    }
}

impl Default for HurstInterpretation {
    fn default() -> Self {
        ANALYSIS.spectral.interpretation
    }
}

impl Default for SpectralConfig {
    fn default() -> Self {
        ANALYSIS.spectral
    }
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        ANALYSIS.volatility
    }
}

impl Default for RegimeConfig {
    fn default() -> Self {
        ANALYSIS.regime
    }
}

impl Default for MomentumConfig {
    fn default() -> Self {
        ANALYSIS.momentum
    }
}

impl Default for EigenConfig {
    fn default() -> Self {
        ANALYSIS.eigen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_orders_cover_zero_to_one_in_twenty_one_steps() {
        let orders = ANALYSIS.fractional.orders();
        assert_eq!(orders.len(), 21);
        assert_eq!(orders[0], 0.0);
        assert!((orders[20] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn partial_override_keeps_defaults() {
        let cfg: AnalysisConfig =
            serde_json::from_str(r#"{ "regime": { "n_states": 2 } }"#).unwrap();
        assert_eq!(cfg.regime.n_states, 2);
        assert_eq!(cfg.regime.max_iter, ANALYSIS.regime.max_iter);
        assert_eq!(cfg.periods_per_year, 252.0);
        assert_eq!(cfg.spectral.interpretation.trending, "Trending");
    }
}
