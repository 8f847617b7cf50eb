use std::collections::BTreeMap;
use std::sync::Arc;

use futures::{StreamExt, stream};
use tokio::time::Instant;

use crate::analysis::metrics::{build_metrics, momentum};
use crate::analysis::{SynthesisInputs, eigenportfolios, realized_volatility, synthesize};
use crate::config::AppConfig;
use crate::data::MarketDataProvider;
use crate::engine::cache::{CacheStats, ResultCache};
use crate::engine::messages::NodeResults;
use crate::engine::worker::{GraphContext, run_graph};
use crate::error::{AnalysisError, EngineError, ErrorKind, ProviderError};
use crate::models::{AnalysisRecord, AnalyzerKind, Downgrade, EigenportfolioResult, PriceSeries};
use crate::trace_time;

/// Entry point for the presentation layer: fetch, fan out the analyzers, synthesize.
pub struct QuantEngine {
    provider: Arc<dyn MarketDataProvider>,
    config: Arc<AppConfig>,
    cache: Option<Arc<ResultCache>>,
}

impl QuantEngine {
    pub fn new(provider: Arc<dyn MarketDataProvider>, config: AppConfig) -> Self {
        let cache = config
            .engine
            .cache_enabled
            .then(|| Arc::new(ResultCache::new(config.engine.cache_ttl())));
        Self {
            provider,
            config: Arc::new(config),
            cache,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    fn validate_lookback(&self, lookback_days: usize) -> Result<(), EngineError> {
        let max = self.config.engine.max_lookback_days;
        if lookback_days == 0 || lookback_days > max {
            return Err(EngineError::InvalidRequest(format!(
                "lookback_days must be in 1..={}, got {}",
                max, lookback_days
            )));
        }
        Ok(())
    }

    async fn fetch_series(
        &self,
        symbol: &str,
        lookback_days: usize,
        deadline: Instant,
    ) -> Result<PriceSeries, EngineError> {
        let candles = tokio::time::timeout_at(deadline, self.provider.fetch_candles(symbol, lookback_days))
            .await
            .map_err(|_| ProviderError::Unavailable(format!("fetching {} timed out", symbol)))??;

        let series = PriceSeries::from_candles(symbol, &candles).map_err(|source| {
            EngineError::InvalidSeries {
                symbol: symbol.to_string(),
                source,
            }
        })?;
        Ok(series.most_recent(lookback_days))
    }

    /// Analyze one symbol. Only data-layer failures and invalid requests fail the call;
    /// analyzer failures become downgrades on the record.
    pub async fn analyze(&self, symbol: &str, lookback_days: usize) -> Result<AnalysisRecord, EngineError> {
        self.validate_lookback(lookback_days)?;
        let deadline = Instant::now() + self.config.engine.request_timeout();

        let series = Arc::new(self.fetch_series(symbol, lookback_days, deadline).await?);
        log::info!(
            "Analyzing {} ({} bars, lookback {} days)",
            symbol,
            series.len(),
            lookback_days
        );

        let ctx = GraphContext {
            series: series.clone(),
            config: self.config.clone(),
            cache: self.cache.clone(),
            lookback_days,
            request_deadline: deadline,
        };
        let results = run_graph(ctx).await;

        let record = trace_time!("assemble record", 5_000, {
            assemble(&series, lookback_days, &self.config, results)
        });
        log::info!(
            "{}: {} (confidence {:.1}, strength {:+.2}, {} downgrade(s))",
            symbol,
            record.recommendation.recommendation,
            record.recommendation.confidence,
            record.recommendation.signal_strength,
            record.downgrades.len()
        );
        Ok(record)
    }

    /// Analyze many symbols with bounded concurrency. Each symbol succeeds or fails alone.
    pub async fn batch_analyze(
        &self,
        symbols: &[String],
        lookback_days: usize,
    ) -> BTreeMap<String, Result<AnalysisRecord, EngineError>> {
        let concurrency = self.config.engine.batch_concurrency.max(1);
        stream::iter(symbols.iter().cloned())
            .map(|symbol| async move {
                let result = self.analyze(&symbol, lookback_days).await;
                if let Err(e) = &result {
                    log::warn!("{}: analysis failed: {}", symbol, e);
                }
                (symbol, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    /// Correlation-matrix PCA over several instruments aligned on shared timestamps.
    pub async fn eigenportfolios(
        &self,
        symbols: &[String],
        lookback_days: usize,
        top_k: usize,
    ) -> Result<EigenportfolioResult, EngineError> {
        self.validate_lookback(lookback_days)?;
        if symbols.len() < 2 {
            return Err(EngineError::InsufficientInstruments {
                required: 2,
                actual: symbols.len(),
            });
        }
        let deadline = Instant::now() + self.config.engine.request_timeout();

        let fetched: Vec<Result<PriceSeries, EngineError>> = stream::iter(symbols)
            .map(|symbol| self.fetch_series(symbol, lookback_days, deadline))
            .buffered(self.config.engine.batch_concurrency.max(1))
            .collect()
            .await;
        let series = fetched.into_iter().collect::<Result<Vec<_>, _>>()?;

        let top_k = top_k.max(1);
        let eigen_config = self.config.analysis.eigen.clone();
        let handle = tokio::task::spawn_blocking(move || eigenportfolios(&series, top_k, &eigen_config));
        let result = tokio::time::timeout_at(deadline, handle)
            .await
            .map_err(|_| AnalysisError::Timeout {
                millis: self.config.engine.request_timeout_ms,
            })?
            .map_err(|e| AnalysisError::NumericalDegeneracy(format!("eigen task aborted: {}", e)))??;
        Ok(result)
    }
}

fn downgrade(symbol: &str, analyzer: AnalyzerKind, error: &AnalysisError, fallback: bool) -> Downgrade {
    log::warn!("{}: {} downgraded ({}): {}", symbol, analyzer, error.kind(), error);
    Downgrade {
        symbol: symbol.to_string(),
        analyzer,
        kind: error.kind(),
        message: error.to_string(),
        fallback,
    }
}

/// Keep the value or record why it is missing.
fn keep<T>(
    symbol: &str,
    analyzer: AnalyzerKind,
    result: Result<T, AnalysisError>,
    downgrades: &mut Vec<Downgrade>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            downgrades.push(downgrade(symbol, analyzer, &e, false));
            None
        }
    }
}

fn tail(values: &[f64], len: usize) -> Vec<f64> {
    values[values.len().saturating_sub(len)..].to_vec()
}

/// Build the immutable record from the joined node results.
pub fn assemble(
    series: &PriceSeries,
    lookback_days: usize,
    config: &AppConfig,
    results: NodeResults,
) -> AnalysisRecord {
    let symbol = series.symbol.as_str();
    let analysis = &config.analysis;
    let mut downgrades = Vec::new();

    let fractional_diff = keep(symbol, AnalyzerKind::FractionalDiff, results.fractional_diff, &mut downgrades);
    let stationarity = keep(symbol, AnalyzerKind::Stationarity, results.stationarity, &mut downgrades);
    let spectral = keep(symbol, AnalyzerKind::Spectral, results.spectral, &mut downgrades);
    let volatility = keep(symbol, AnalyzerKind::Volatility, results.volatility, &mut downgrades);
    let regime = keep(symbol, AnalyzerKind::Regime, results.regime, &mut downgrades);

    if let Some(reason) = volatility.as_ref().and_then(|v| v.degraded.as_ref()) {
        let error = AnalysisError::ModelDivergence(reason.clone());
        downgrades.push(downgrade(symbol, AnalyzerKind::Volatility, &error, true));
    }

    let (signal_processing, wavelet_denoised) = match spectral {
        Some(mut out) => {
            if out.result.fractional_diff_order.is_none() {
                out.result.fractional_diff_order = fractional_diff.as_ref().map(|f| f.order);
            }
            let denoised = out.denoised.map(|d| tail(&d, analysis.spectral.tail_len));
            (Some(out.result), denoised)
        }
        None => (None, None),
    };

    let momentum = momentum(series, &analysis.momentum, analysis.periods_per_year);
    let realized = (series.len() > 2).then(|| {
        realized_volatility(series, analysis.volatility.realized_window, analysis.periods_per_year)
    });
    let metrics = build_metrics(
        series,
        analysis,
        momentum.as_ref(),
        realized.as_ref(),
        signal_processing.as_ref(),
    );

    let recommendation = synthesize(
        &SynthesisInputs {
            stationarity: stationarity.as_ref(),
            volatility: volatility.as_ref(),
            regime: regime.as_ref(),
            signal_processing: signal_processing.as_ref(),
            momentum: momentum.as_ref(),
        },
        &config.synthesis,
    );

    let fractional_diff_series = fractional_diff
        .as_ref()
        .map(|f| f.tail(analysis.fractional.tail_len))
        .unwrap_or_default();

    AnalysisRecord {
        symbol: series.symbol.clone(),
        timestamp: series.last_timestamp_ms(),
        as_of_date: series.as_of_date(),
        lookback_days,
        bars: series.len(),
        current_price: series.current_price(),
        price_change_pct: series.price_change_pct(),
        stationarity,
        fractional_diff,
        signal_processing,
        volatility,
        regime,
        recommendation,
        metrics,
        fractional_diff_series,
        wavelet_denoised,
        downgrades,
    }
}

/// Timeouts are the only downgrades that depend on wall-clock timing.
pub fn timed_out(record: &AnalysisRecord) -> bool {
    record.downgrades.iter().any(|d| d.kind == ErrorKind::Timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::volatility::sample_fallback;
    use crate::data::synthetic;
    use crate::models::{Factor, RealizedVolatility, VolatilityModelType};

    fn missing(actual: usize) -> AnalysisError {
        AnalysisError::insufficient(1_000, actual)
    }

    #[test]
    fn diverged_volatility_is_kept_as_a_flagged_fallback() {
        let candles = synthetic::geometric_brownian(120, 100.0, 0.0, 0.01, 3);
        let series = PriceSeries::from_candles("DEG", &candles).unwrap();
        let config = AppConfig::default();
        let degraded = sample_fallback(
            &series.log_returns(),
            config.analysis.volatility.horizon,
            config.analysis.periods_per_year.sqrt(),
            RealizedVolatility::default(),
            "persistence 1.0004 is not below 0.999".to_string(),
        );

        let results = NodeResults {
            stationarity: Err(missing(120)),
            fractional_diff: Err(missing(120)),
            spectral: Err(missing(119)),
            volatility: Ok(degraded),
            regime: Err(missing(119)),
        };
        let record = assemble(&series, 120, &config, results);

        let volatility = record.volatility.as_ref().unwrap();
        assert_eq!(volatility.model_type, VolatilityModelType::Sample);
        assert_eq!(volatility.forecasted_volatility.len(), config.analysis.volatility.horizon);

        let fallback: Vec<&Downgrade> = record.downgrades.iter().filter(|d| d.fallback).collect();
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].analyzer, AnalyzerKind::Volatility);
        assert_eq!(fallback[0].kind, ErrorKind::ModelDivergence);
        assert!(fallback[0].message.contains("persistence"));

        let rec = &record.recommendation;
        let vote = rec.vote(Factor::Volatility).expect("fallback volatility still votes");
        assert!(vote.detail.starts_with("Sample"));
        assert!(!rec.unavailable.contains(&Factor::Volatility));
    }

    #[test]
    fn a_healthy_record_has_no_fallback_downgrades() {
        let candles = synthetic::geometric_brownian(30, 100.0, 0.0, 0.01, 4);
        let series = PriceSeries::from_candles("OK", &candles).unwrap();
        let results = NodeResults {
            stationarity: Err(missing(30)),
            fractional_diff: Err(missing(30)),
            spectral: Err(missing(29)),
            volatility: Err(missing(29)),
            regime: Err(missing(29)),
        };
        let record = assemble(&series, 30, &AppConfig::default(), results);
        assert_eq!(record.downgrades.len(), 5);
        assert!(record.downgrades.iter().all(|d| !d.fallback));
        assert_eq!(record.timestamp, series.last_timestamp_ms());
    }
}
