use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// The analyzers that cast votes, in reasoning tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter)]
pub enum Factor {
    #[strum(serialize = "Hurst")]
    Hurst,
    #[strum(serialize = "regime")]
    Regime,
    #[strum(serialize = "momentum")]
    Momentum,
    #[strum(serialize = "volatility")]
    Volatility,
    #[strum(serialize = "stationarity")]
    Stationarity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Stance {
    TrendFollowing,
    Contrarian,
    RiskAdjustment,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub factor: Factor,
    /// Signed opinion in [-1, 1].
    pub value: f64,
    pub weight: f64,
    pub stance: Stance,
    pub detail: String,
}

impl Vote {
    pub fn contribution(&self) -> f64 {
        self.weight * self.value
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommendation: Signal,
    /// 0 to 100.
    pub confidence: f64,
    /// -1 to 1.
    pub signal_strength: f64,
    pub reasoning: String,
    pub votes: Vec<Vote>,
    /// Factors with no usable input.
    pub unavailable: Vec<Factor>,
}

impl Recommendation {
    pub fn vote(&self, factor: Factor) -> Option<&Vote> {
        self.votes.iter().find(|v| v.factor == factor)
    }
}
