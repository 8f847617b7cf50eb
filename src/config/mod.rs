//! Configuration module for the quant engine.

mod analysis;
mod debug;
mod engine;
mod persistence;
mod synthesis;
mod types;

// Public
pub mod constants;

// Re-export commonly used items
pub use analysis::{
    ANALYSIS, AnalysisConfig, EigenConfig, FractionalConfig, HurstInterpretation, MomentumConfig, RegimeConfig,
    SeriesInput, SpectralConfig, StationarityConfig, VolatilityConfig, VolatilityModel,
};
pub use debug::{DEBUG_FLAGS, LOG_PERFORMANCE};
pub use engine::{ENGINE, EngineConfig};
pub use persistence::{AppConfig, load_config};
pub use synthesis::{SYNTHESIS, SynthesisConfig, VoteWeights};
pub use types::{Prob, Weight};
