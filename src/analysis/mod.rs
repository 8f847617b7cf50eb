// Analyzers, the synthesizer and their numerical building blocks
pub mod eigenportfolio;
pub mod fractional;
pub mod garch;
pub mod metrics;
pub mod optimizer;
pub mod regime;
pub mod spectral;
pub mod stationarity;
pub mod synthesizer;
pub mod volatility;
pub mod wavelet;

pub use eigenportfolio::eigenportfolios;
pub use fractional::find_min_order;
pub use regime::detect_regimes;
pub use spectral::analyze_spectrum;
pub use stationarity::analyze_stationarity;
pub use synthesizer::{SynthesisInputs, synthesize};
pub use volatility::{forecast_volatility, realized_volatility};
