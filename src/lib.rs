#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

// Core modules
pub mod analysis;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod models;
pub mod utils;

// Re-export commonly used types outside of crate
pub use config::{AppConfig, load_config};
pub use data::{CsvProvider, InMemoryProvider, MarketDataProvider};
pub use domain::Candle;
pub use engine::QuantEngine;
pub use error::{AnalysisError, EngineError, ErrorKind, ProviderError};
pub use models::{AnalysisRecord, EigenportfolioResult, PriceSeries, Recommendation, Signal};

// CLI argument parsing
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::constants::engine::DEFAULT_LOOKBACK_DAYS;
use crate::data::synthetic::SyntheticKind;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Quantitative signal synthesis engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding one `<SYMBOL>.csv` per instrument
    #[arg(long, global = true, default_value = "data")]
    pub data_dir: PathBuf,

    /// Serve generated bars instead of reading CSV files
    #[arg(long, global = true)]
    pub synthetic: Option<SyntheticKind>,

    /// Trading days of history to analyze
    #[arg(long, global = true, default_value_t = DEFAULT_LOOKBACK_DAYS)]
    pub lookback: usize,

    /// JSON file with configuration overrides
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Log debug output from the engine
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Analyze one or more symbols and print a recommendation for each
    Analyze {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Principal components of the symbols' return correlation matrix
    Eigen {
        #[arg(required = true, num_args = 2..)]
        symbols: Vec<String>,

        /// Number of components to report
        #[arg(long, default_value_t = 3)]
        top: usize,
    },
}
