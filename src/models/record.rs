use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::error::ErrorKind;
use crate::models::{
    FractionalDiffResult, Recommendation, RegimeResult, SignalProcessingResult, StationarityResult,
    VolatilityResult,
};

/// Nodes of the per-symbol task graph. Also the last component of a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter)]
pub enum AnalyzerKind {
    Stationarity,
    FractionalDiff,
    Spectral,
    Volatility,
    Regime,
}

/// An analyzer whose output was dropped or replaced by a fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Downgrade {
    pub symbol: String,
    pub analyzer: AnalyzerKind,
    pub kind: ErrorKind,
    pub message: String,
    /// A degraded substitute was used instead of dropping the result.
    pub fallback: bool,
}

/// The unit returned across the engine boundary. Built once per request, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub symbol: String,
    /// Epoch milliseconds of the newest bar.
    pub timestamp: i64,
    pub as_of_date: Option<NaiveDate>,
    pub lookback_days: usize,
    pub bars: usize,
    pub current_price: f64,
    pub price_change_pct: f64,

    pub stationarity: Option<StationarityResult>,
    pub fractional_diff: Option<FractionalDiffResult>,
    pub signal_processing: Option<SignalProcessingResult>,
    pub volatility: Option<VolatilityResult>,
    pub regime: Option<RegimeResult>,
    pub recommendation: Recommendation,

    pub metrics: BTreeMap<String, f64>,
    pub fractional_diff_series: Vec<f64>,
    pub wavelet_denoised: Option<Vec<f64>>,
    pub downgrades: Vec<Downgrade>,
}
