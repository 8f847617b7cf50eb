use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::config::SeriesInput;

/// MacKinnon-style critical values at the 1%, 5% and 10% levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalValues {
    pub one_pct: f64,
    pub five_pct: f64,
    pub ten_pct: f64,
}

/// ADF and KPSS have opposite nulls; the verdict reconciles them without hiding either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum StationarityVerdict {
    /// ADF rejects a unit root and KPSS (if run) does not reject stationarity.
    Stationary,
    /// ADF cannot reject a unit root and KPSS (if run) rejects stationarity.
    NonStationary,
    /// The two tests disagree.
    Inconclusive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationarityResult {
    pub adf_statistic: f64,
    pub adf_pvalue: f64,
    /// `adf_pvalue < significance`, with the engine-wide significance level.
    pub is_stationary: bool,
    pub kpss_statistic: Option<f64>,
    pub kpss_pvalue: Option<f64>,

    pub adf_used_lag: usize,
    pub adf_nobs: usize,
    pub adf_critical_values: CriticalValues,
    pub kpss_lags: Option<usize>,
    pub verdict: StationarityVerdict,
    /// Which series was tested.
    pub input: SeriesInput,
}
