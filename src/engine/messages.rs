use std::time::Duration;

use chrono::NaiveDate;

use crate::analysis::spectral::SpectralOutput;
use crate::error::AnalysisError;
use crate::models::{
    AnalyzerKind, FractionalDiffResult, RegimeResult, StationarityResult, VolatilityResult,
};

/// Identity of one analyzer run. Results for equal keys are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub symbol: String,
    pub lookback_days: usize,
    pub as_of_date: Option<NaiveDate>,
    pub analyzer: AnalyzerKind,
}

/// What a node of the task graph hands back to the join.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    Stationarity(StationarityResult),
    FractionalDiff(FractionalDiffResult),
    Spectral(SpectralOutput),
    Volatility(VolatilityResult),
    Regime(RegimeResult),
}

impl NodeOutput {
    pub fn kind(&self) -> AnalyzerKind {
        match self {
            NodeOutput::Stationarity(_) => AnalyzerKind::Stationarity,
            NodeOutput::FractionalDiff(_) => AnalyzerKind::FractionalDiff,
            NodeOutput::Spectral(_) => AnalyzerKind::Spectral,
            NodeOutput::Volatility(_) => AnalyzerKind::Volatility,
            NodeOutput::Regime(_) => AnalyzerKind::Regime,
        }
    }
}

pub type NodeResult = Result<NodeOutput, AnalysisError>;

/// Per-node wall-clock budget, before clipping to the request deadline.
pub fn node_budget(kind: AnalyzerKind, fit: Duration, fast: Duration) -> Duration {
    match kind {
        AnalyzerKind::Volatility | AnalyzerKind::Regime | AnalyzerKind::FractionalDiff => fit,
        AnalyzerKind::Stationarity | AnalyzerKind::Spectral => fast,
    }
}

/// Everything the join collected for one symbol, ready for synthesis.
#[derive(Debug, Clone)]
pub struct NodeResults {
    pub stationarity: Result<StationarityResult, AnalysisError>,
    pub fractional_diff: Result<FractionalDiffResult, AnalysisError>,
    pub spectral: Result<SpectralOutput, AnalysisError>,
    pub volatility: Result<VolatilityResult, AnalysisError>,
    pub regime: Result<RegimeResult, AnalysisError>,
}
