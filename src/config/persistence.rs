//! Loading configuration overrides from disk.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, EngineConfig, SynthesisConfig};

/// Everything tunable at runtime. Missing sections and fields fall back to the
/// compile-time blueprints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analysis: AnalysisConfig,
    pub synthesis: SynthesisConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Reject window and step sizes the analyzers cannot work with.
    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        ensure!(a.periods_per_year > 0.0, "analysis.periods_per_year must be positive");
        ensure!(a.stationarity.min_length > 0, "analysis.stationarity.min_length must be positive");
        ensure!(
            a.fractional.step > 0.0 && a.fractional.max_order > 0.0,
            "analysis.fractional.step and max_order must be positive"
        );
        ensure!(a.spectral.min_window >= 2, "analysis.spectral.min_window must be at least 2");
        ensure!(a.spectral.window_count >= 3, "analysis.spectral.window_count must be at least 3");
        ensure!(a.spectral.min_window_span >= 1, "analysis.spectral.min_window_span must be positive");
        ensure!(
            a.volatility.horizon > 0 && a.volatility.realized_window > 1,
            "analysis.volatility.horizon and realized_window must be positive"
        );
        ensure!(
            a.regime.min_states >= 1 && a.regime.min_states <= a.regime.n_states,
            "analysis.regime needs 1 <= min_states <= n_states"
        );
        ensure!(a.regime.max_iter > 0, "analysis.regime.max_iter must be positive");
        ensure!(a.momentum.window > 1, "analysis.momentum.window must be at least 2");
        ensure!(a.eigen.s_score_window > 2, "analysis.eigen.s_score_window must be at least 3");
        ensure!(self.engine.batch_concurrency > 0, "engine.batch_concurrency must be positive");
        ensure!(
            self.engine.max_lookback_days > 0,
            "engine.max_lookback_days must be positive"
        );
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: AppConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config file {}", path.display()))?;
    log::info!("Loaded configuration overrides from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_partial_overrides_from_file() {
        let path = std::env::temp_dir().join(format!("quant-engine-cfg-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "engine": { "cache_enabled": false }, "analysis": { "volatility": { "model": "GjrGarch" } } }"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(!cfg.engine.cache_enabled);
        assert_eq!(cfg.engine.cache_ttl_secs, 3600);
        assert_eq!(cfg.analysis.volatility.model, crate::config::VolatilityModel::GjrGarch);
        assert_eq!(cfg.synthesis.max_reasons, 3);
    }

    #[test]
    fn shipped_defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_spectral_window_is_rejected_at_load() {
        let path = std::env::temp_dir().join(format!("quant-engine-zero-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "analysis": { "spectral": { "min_window": 0 } } }"#).unwrap();

        let err = load_config(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(err.to_string().contains("invalid config file"));
        assert!(format!("{:#}", err).contains("min_window"));
    }

    #[test]
    fn missing_file_is_an_error_with_context() {
        let err = load_config(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("reading config file"));
    }
}
