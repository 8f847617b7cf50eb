use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::config::SeriesInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum HurstRegime {
    MeanReverting,
    RandomWalk,
    Trending,
}

/// Minimal-order fractional difference that passed the ADF test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FractionalDiffResult {
    pub order: f64,
    /// ADF p-value of the differenced series at `order`.
    pub adf_pvalue: f64,
    /// Width of the truncated binomial filter.
    pub window: usize,
    /// Differenced log-price series. Shorter than the input by `window - 1`.
    #[serde(skip)]
    pub differenced: Vec<f64>,
}

impl FractionalDiffResult {
    pub fn tail(&self, len: usize) -> Vec<f64> {
        let start = self.differenced.len().saturating_sub(len);
        self.differenced[start..].to_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalProcessingResult {
    /// `None` when no order up to the cap made the series stationary.
    pub fractional_diff_order: Option<f64>,
    /// Always inside [0, 1].
    pub hurst_exponent: f64,
    /// The raw R/S slope fell outside [0, 1] and was clamped.
    pub hurst_clamped: bool,
    pub hurst_regime: HurstRegime,
    pub hurst_interpretation: String,
    /// Cycles per bar. `None` when the centred series carries no power.
    pub dominant_frequency: Option<f64>,
    /// Bars per cycle, `1 / dominant_frequency`.
    pub dominant_period: Option<f64>,
    pub denoised: bool,
    pub input: SeriesInput,
}

/// Recent price behaviour consumed by the synthesizer alongside the analyzer results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Momentum {
    /// Simple return over the momentum window.
    pub window_return: f64,
    /// Z-score of the last close against the window's mean and deviation.
    pub zscore: f64,
    /// Annualised Sharpe ratio of the whole series.
    pub sharpe: f64,
    /// Last one-bar simple return.
    pub last_change: f64,
}
