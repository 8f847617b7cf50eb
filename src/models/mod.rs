// Data models produced by the analyzers and the engine
mod eigen;
mod ohlcv;
mod recommendation;
mod record;
mod regime;
mod signal;
mod stationarity;
mod volatility;

pub use eigen::{EigenportfolioResult, PrincipalComponent, SScore};
pub use ohlcv::PriceSeries;
pub use recommendation::{Factor, Recommendation, Signal, Stance, Vote};
pub use record::{AnalysisRecord, AnalyzerKind, Downgrade};
pub use regime::{RegimeDirection, RegimeResult, RegimeState, RegimeStatistics, VolatilityTier};
pub use signal::{FractionalDiffResult, HurstRegime, Momentum, SignalProcessingResult};
pub use stationarity::{CriticalValues, StationarityResult, StationarityVerdict};
pub use volatility::{RealizedVolatility, VolatilityModelType, VolatilityResult};
