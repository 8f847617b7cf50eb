// Top Level Constants
pub const TRADING_PERIODS_PER_YEAR: f64 = 252.0;

/// How many trailing values of derived series (fractional diff, wavelet) go into a record.
pub const SERIES_TAIL_LEN: usize = 50;

pub mod stationarity {
    pub const SIGNIFICANCE: f64 = 0.05;
    pub const KPSS_SIGNIFICANCE: f64 = 0.05;
    pub const MIN_LENGTH: usize = 20;
    /// Magnitude substituted for a test statistic when the regression fits exactly.
    pub const STATISTIC_CAP: f64 = 100.0;

    pub mod kpss {
        pub const CRITICAL_VALUES: [f64; 4] = [0.347, 0.463, 0.574, 0.739];
        pub const P_VALUES: [f64; 4] = [0.10, 0.05, 0.025, 0.01];
    }
}

pub mod fractional {
    pub const STEP: f64 = 0.05;
    pub const MAX_ORDER: f64 = 1.0;
    pub const WEIGHT_THRESHOLD: f64 = 1e-4;
    /// Filter width is capped at this share of the series length.
    pub const MAX_WINDOW_FRACTION: f64 = 0.5;
    pub const MIN_LENGTH: usize = 40;
}

pub mod spectral {
    pub const MIN_HURST_WINDOW: usize = 8;
    pub const HURST_WINDOW_COUNT: usize = 10;
    /// Largest / smallest window must be at least this ratio.
    pub const MIN_WINDOW_SPAN: usize = 10;
    pub const WAVELET_LEVELS: usize = 3;
}

pub mod volatility {
    pub const REALIZED_WINDOW: usize = 20;
    pub const FORECAST_HORIZON: usize = 10;
    pub const MIN_RETURNS: usize = 100;
    /// GARCH is fit on percentage returns for numerical conditioning.
    pub const RETURN_SCALE: f64 = 100.0;
    pub const MAX_PERSISTENCE: f64 = 0.999;
    pub const MAX_OPTIMIZER_ITER: usize = 2000;
}

pub mod regime {
    pub const N_STATES: usize = 3;
    /// Smallest state count tried when selecting the model by BIC.
    pub const MIN_STATES: usize = 2;
    pub const MIN_RETURNS: usize = 50;
    pub const MAX_ITER: usize = 500;
    pub const TOLERANCE: f64 = 1e-7;
    pub const RETURN_SCALE: f64 = 100.0;
    pub const VARIANCE_FLOOR_RATIO: f64 = 1e-3;
    /// Mean (in percent per bar) inside which a state counts as sideways.
    pub const MEAN_DEAD_BAND: f64 = 0.05;
}

pub mod eigen {
    pub const MIN_OBSERVATIONS: usize = 20;
    /// Trailing residuals used to standardise the S-score.
    pub const S_SCORE_WINDOW: usize = 60;
}

pub mod momentum {
    pub const WINDOW: usize = 20;
    pub const SHARPE_CAP: f64 = 10.0;
}

pub mod engine {
    pub const MAX_LOOKBACK_DAYS: usize = 2520;
    pub const DEFAULT_LOOKBACK_DAYS: usize = 252;
    pub const CACHE_TTL_SECS: u64 = 3600;
    pub const REQUEST_TIMEOUT_MS: u64 = 30_000;
    pub const FIT_TIMEOUT_MS: u64 = 10_000;
    pub const FAST_TIMEOUT_MS: u64 = 5_000;
    pub const BATCH_CONCURRENCY: usize = 4;
}
