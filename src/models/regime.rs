use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
pub enum VolatilityTier {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum RegimeDirection {
    Bull,
    Bear,
    Sideways,
}

/// One fitted HMM state after canonical re-indexing (ascending variance, then mean).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeState {
    pub index: usize,
    /// Emission mean in percent per bar.
    pub mean: f64,
    /// Emission variance in percent squared.
    pub variance: f64,
    /// Long-run share of time in this state under the fitted transition matrix.
    pub stationary_probability: f64,
    pub tier: VolatilityTier,
    pub direction: RegimeDirection,
    pub label: String,
}

/// Realised behaviour of the bars decoded into one state. Returns are raw log returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeStatistics {
    pub observations: usize,
    /// Share of the decoded path spent in this state.
    pub frequency: f64,
    pub mean_return: f64,
    /// Sample standard deviation of the state's returns.
    pub volatility: f64,
    /// Per-bar `mean_return / volatility`, zero when the state has no dispersion.
    pub sharpe_ratio: f64,
    pub min_return: f64,
    pub max_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeResult {
    /// `argmax(regime_probabilities)`.
    pub current_regime: usize,
    /// Posterior over states for the most recent observation. Sums to 1.
    pub regime_probabilities: Vec<f64>,
    pub regime_descriptions: BTreeMap<usize, String>,
    pub n_states: usize,
    pub states: Vec<RegimeState>,
    pub transition_matrix: Vec<Vec<f64>>,
    pub log_likelihood: f64,
    /// BIC of the selected model; lower is better.
    pub bic: f64,
    /// BIC of every state count that fitted, keyed by state count.
    pub bic_by_states: BTreeMap<usize, f64>,
    pub iterations: usize,
    /// Most likely state of every return (Viterbi path), in canonical indices.
    pub history: Vec<usize>,
    /// Keyed by canonical state index; states the path never visits are absent.
    pub statistics: BTreeMap<usize, RegimeStatistics>,
}

impl RegimeResult {
    pub fn current_state(&self) -> Option<&RegimeState> {
        self.states.get(self.current_regime)
    }

    pub fn current_posterior(&self) -> f64 {
        self.regime_probabilities
            .get(self.current_regime)
            .copied()
            .unwrap_or(0.0)
    }
}
