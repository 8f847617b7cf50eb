//! Error taxonomy.
//!
//! Analyzer-local failures ([`AnalysisError`]) are downgraded to missing inputs by the engine.
//! Only provider failures and malformed requests surface as [`EngineError`].

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("insufficient data: need at least {required} points, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    #[error("model fit failed: {0}")]
    ModelFitFailure(String),

    #[error("model diverged: {0}")]
    ModelDivergence(String),

    #[error("no stationary fractional order found up to d = {max_order}")]
    NoStationaryOrderFound { max_order: f64 },

    #[error("analyzer timed out after {millis}ms")]
    Timeout { millis: u64 },
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientData { .. } => ErrorKind::InsufficientData,
            Self::NumericalDegeneracy(_) => ErrorKind::NumericalDegeneracy,
            Self::ModelFitFailure(_) => ErrorKind::ModelFitFailure,
            Self::ModelDivergence(_) => ErrorKind::ModelDivergence,
            Self::NoStationaryOrderFound { .. } => ErrorKind::NoStationaryOrderFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    pub(crate) fn insufficient(required: usize, actual: usize) -> Self {
        Self::InsufficientData { required, actual }
    }
}

/// Flat tag for downgrade records and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString)]
pub enum ErrorKind {
    InsufficientData,
    NumericalDegeneracy,
    ModelFitFailure,
    ModelDivergence,
    NoStationaryOrderFound,
    Timeout,
}

/// Failures reported by a market-data provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("data provider unavailable: {0}")]
    Unavailable(String),
}

/// Rejected bar data while building a `PriceSeries`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("timestamps must be strictly increasing (index {index}: {previous} -> {current})")]
    NonIncreasingTimestamp {
        index: usize,
        previous: i64,
        current: i64,
    },

    #[error("bar {index} has a non-finite or non-positive price")]
    InvalidPrice { index: usize },

    #[error("bar {index} violates low <= open/close <= high")]
    InconsistentRange { index: usize },

    #[error("price series is empty")]
    Empty,
}

/// Request-level failures. These are the only errors that fail an `analyze` call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("data provider unavailable: {0}")]
    DataProviderUnavailable(String),

    #[error("invalid price series for {symbol}: {source}")]
    InvalidSeries {
        symbol: String,
        #[source]
        source: SeriesError,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("need at least {required} instruments with overlapping history, got {actual}")]
    InsufficientInstruments { required: usize, actual: usize },

    #[error("cross-sectional analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
}

impl From<ProviderError> for EngineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::SymbolNotFound(symbol) => Self::SymbolNotFound(symbol),
            ProviderError::Unavailable(reason) => Self::DataProviderUnavailable(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_map_to_distinct_engine_errors() {
        let not_found: EngineError = ProviderError::SymbolNotFound("XYZ".into()).into();
        let down: EngineError = ProviderError::Unavailable("timeout".into()).into();
        assert_eq!(not_found, EngineError::SymbolNotFound("XYZ".into()));
        assert_eq!(down, EngineError::DataProviderUnavailable("timeout".into()));
    }

    #[test]
    fn error_kind_round_trips_through_its_name() {
        let kind = AnalysisError::insufficient(20, 15).kind();
        assert_eq!(kind.to_string(), "InsufficientData");
        assert_eq!("Timeout".parse::<ErrorKind>().unwrap(), ErrorKind::Timeout);
    }
}
