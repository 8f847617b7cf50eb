use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum VolatilityModelType {
    #[strum(serialize = "GARCH(1,1)")]
    Garch,
    #[strum(serialize = "GJR-GARCH(1,1)")]
    GjrGarch,
    /// Unconditional sample volatility used after a model diverged.
    #[strum(serialize = "Sample")]
    Sample,
}

/// Range-based and close-to-close estimators over the trailing window, annualised.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RealizedVolatility {
    pub close_to_close: Option<f64>,
    pub parkinson: Option<f64>,
    pub garman_klass: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityResult {
    pub model_type: VolatilityModelType,
    /// Per-bar conditional volatility of the last observation (decimal, not percent).
    pub current_volatility: f64,
    /// `current_volatility * sqrt(periods_per_year)`.
    pub annualized_volatility: f64,
    /// Per-bar volatility forecasts, one per horizon step, all non-negative.
    pub forecasted_volatility: Vec<f64>,
    pub parameters: BTreeMap<String, f64>,
    pub log_likelihood: Option<f64>,
    pub aic: Option<f64>,
    pub bic: Option<f64>,
    pub persistence: Option<f64>,
    pub half_life: Option<f64>,
    pub realized: RealizedVolatility,
    /// Set when the conditional model failed and sample volatility stands in.
    pub degraded: Option<String>,
}
