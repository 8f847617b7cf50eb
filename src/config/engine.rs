//! Runtime configuration for the analysis engine (timeouts, cache, batching).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::constants::engine;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Total wall-clock budget for one `analyze` call.
    pub request_timeout_ms: u64,
    /// Budget for the iterative fits (GARCH, HMM, fractional order search).
    pub fit_timeout_ms: u64,
    /// Budget for the closed-form analyzers.
    pub fast_timeout_ms: u64,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    /// Symbols analysed concurrently by `batch_analyze`.
    pub batch_concurrency: usize,
    pub max_lookback_days: usize,
}

pub const ENGINE: EngineConfig = EngineConfig {
    request_timeout_ms: engine::REQUEST_TIMEOUT_MS,
    fit_timeout_ms: engine::FIT_TIMEOUT_MS,
    fast_timeout_ms: engine::FAST_TIMEOUT_MS,
    cache_enabled: true,
    cache_ttl_secs: engine::CACHE_TTL_SECS,
    batch_concurrency: engine::BATCH_CONCURRENCY,
    max_lookback_days: engine::MAX_LOOKBACK_DAYS,
};

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn fit_timeout(&self) -> Duration {
        Duration::from_millis(self.fit_timeout_ms)
    }

    pub fn fast_timeout(&self) -> Duration {
        Duration::from_millis(self.fast_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        ENGINE
    }
}
