//! Signal synthesis configuration: vote weights, vote rules and decision thresholds.

use serde::{Deserialize, Serialize};

use crate::config::types::{Prob, Weight};

/// Fixed (not learned) weighting table for the analyzer votes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteWeights {
    pub hurst: Weight,
    pub regime: Weight,
    pub momentum: Weight,
    pub volatility: Weight,
    pub stationarity: Weight,
}

impl VoteWeights {
    pub fn total(&self) -> f64 {
        self.hurst.value()
            + self.regime.value()
            + self.momentum.value()
            + self.volatility.value()
            + self.stationarity.value()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub weights: VoteWeights,

    /// `signal_strength` strictly above this is a BUY.
    pub buy_threshold: f64,
    /// `signal_strength` strictly below this is a SELL.
    pub sell_threshold: f64,
    /// Confidence (0-100) at or above which a recommendation counts as high-confidence.
    pub high_confidence: f64,

    /// Posterior needed before a directional regime casts a vote.
    pub regime_min_posterior: Prob,

    /// Annualised volatility bands.
    pub high_volatility: f64,
    pub low_volatility: f64,
    pub volatility_vote: f64,

    /// Annualised Sharpe bands for the momentum vote.
    pub strong_sharpe: f64,
    pub weak_sharpe: f64,

    /// Window return beyond which a non-stationary series votes with the move.
    pub trend_return: f64,
    /// Window return beyond which a stationary series votes against the move.
    pub reversion_return: f64,

    /// Z-score that saturates the contrarian Hurst vote.
    pub zscore_saturation: f64,

    /// How many factors the reasoning sentence names.
    pub max_reasons: usize,
}

pub const SYNTHESIS: SynthesisConfig = SynthesisConfig {
    weights: VoteWeights {
        hurst: Weight::new(0.30),
        regime: Weight::new(0.25),
        momentum: Weight::new(0.20),
        volatility: Weight::new(0.15),
        stationarity: Weight::new(0.10),
    },
    buy_threshold: 0.2,
    sell_threshold: -0.2,
    high_confidence: 60.0,
    regime_min_posterior: Prob::new(0.6),
    high_volatility: 0.40,
    low_volatility: 0.15,
    volatility_vote: 0.5,
    strong_sharpe: 1.5,
    weak_sharpe: 0.5,
    trend_return: 0.02,
    reversion_return: 0.03,
    zscore_saturation: 2.0,
    max_reasons: 3,
};

impl Default for SynthesisConfig {
    fn default() -> Self {
        SYNTHESIS
    }
}

impl Default for VoteWeights {
    fn default() -> Self {
        SYNTHESIS.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        assert!((SYNTHESIS.weights.total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weights_can_be_overridden_individually() {
        let cfg: SynthesisConfig =
            serde_json::from_str(r#"{ "weights": { "hurst": 0.5 }, "buy_threshold": 0.3 }"#)
                .unwrap();
        assert_eq!(cfg.weights.hurst.value(), 0.5);
        assert_eq!(cfg.weights.regime.value(), 0.25);
        assert_eq!(cfg.buy_threshold, 0.3);
        assert_eq!(cfg.sell_threshold, -0.2);
    }
}
