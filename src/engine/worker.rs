//! The per-symbol task graph.
//!
//! ```text
//!            +--> Stationarity (closes | FFD)
//!   FracDiff-+
//!            +--> Spectral (log returns | FFD)
//!   Volatility (OHLC)
//!   Regime (log returns)
//! ```
//!
//! FracDiff is a shared future: its dependents only await it when configured to consume the
//! differenced series. Every node runs on the blocking pool under its own timeout, clipped to
//! the request deadline, so the join always completes by that deadline.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::time::Instant;

use crate::analysis::{analyze_spectrum, analyze_stationarity, detect_regimes, find_min_order, forecast_volatility};
use crate::config::{AppConfig, DEBUG_FLAGS, SeriesInput};
use crate::engine::cache::ResultCache;
use crate::engine::messages::{CacheKey, NodeOutput, NodeResult, NodeResults, node_budget};
use crate::error::AnalysisError;
use crate::models::{AnalyzerKind, FractionalDiffResult, PriceSeries};
use crate::trace_time;
use crate::utils::Deadline;

type SharedFrac = Shared<BoxFuture<'static, Result<FractionalDiffResult, AnalysisError>>>;

/// Immutable inputs shared by every node of one request.
#[derive(Clone)]
pub struct GraphContext {
    pub series: Arc<PriceSeries>,
    pub config: Arc<AppConfig>,
    pub cache: Option<Arc<ResultCache>>,
    pub lookback_days: usize,
    /// Wall-clock end of the whole request.
    pub request_deadline: Instant,
}

impl GraphContext {
    fn key(&self, analyzer: AnalyzerKind) -> CacheKey {
        CacheKey {
            symbol: self.series.symbol.clone(),
            lookback_days: self.lookback_days,
            as_of_date: self.series.as_of_date(),
            analyzer,
        }
    }

    fn budget(&self, kind: AnalyzerKind) -> Duration {
        let engine = &self.config.engine;
        node_budget(kind, engine.fit_timeout(), engine.fast_timeout())
    }

    /// Run `job` through the cache (when enabled) under the node's timeout.
    async fn node<F, Fut>(&self, kind: AnalyzerKind, job: F) -> NodeResult
    where
        F: FnOnce(GraphContext) -> Fut,
        Fut: std::future::Future<Output = NodeResult> + Send + 'static,
    {
        let fut = job(self.clone());
        match &self.cache {
            Some(cache) => cache.get_or_compute(self.key(kind), fut).await,
            None => fut.await,
        }
    }
}

/// Execute `compute` on the blocking pool with a deadline it can poll and an async timeout
/// as the backstop.
pub async fn run_blocking<T, F>(
    name: AnalyzerKind,
    symbol: String,
    budget: Duration,
    request_deadline: Instant,
    compute: F,
) -> Result<T, AnalysisError>
where
    T: Send + 'static,
    F: FnOnce(&Deadline) -> Result<T, AnalysisError> + Send + 'static,
{
    let started = Instant::now();
    let node_deadline = (started + budget).min(request_deadline);
    let remaining = node_deadline.saturating_duration_since(started);
    let polled = Deadline::after(remaining);

    if DEBUG_FLAGS.log_task_graph {
        log::debug!("{}: starting {} (budget {}ms)", symbol, name, remaining.as_millis());
    }

    let label = format!("{}:{}", symbol, name);
    let handle = tokio::task::spawn_blocking(move || trace_time!(label, 200_000, { compute(&polled) }));

    let result = match tokio::time::timeout_at(node_deadline, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(AnalysisError::ModelFitFailure(format!(
            "{} task aborted: {}",
            name, join_error
        ))),
        Err(_) => Err(AnalysisError::Timeout {
            millis: started.elapsed().as_millis() as u64,
        }),
    };

    if DEBUG_FLAGS.log_task_graph {
        log::debug!(
            "{}: {} finished in {}ms ({})",
            symbol,
            name,
            started.elapsed().as_millis(),
            if result.is_ok() { "ok" } else { "failed" }
        );
    }
    result
}

fn unexpected(kind: AnalyzerKind, output: NodeOutput) -> AnalysisError {
    AnalysisError::ModelFitFailure(format!("{} node produced {} output", kind, output.kind()))
}

/// Pick the series a stationarity-sensitive node consumes, falling back to `raw` when the
/// differenced series is unavailable.
async fn resolve_input(
    wanted: SeriesInput,
    frac: SharedFrac,
    raw: Vec<f64>,
    symbol: &str,
) -> (Vec<f64>, SeriesInput, Option<f64>) {
    match wanted {
        SeriesInput::Raw => (raw, SeriesInput::Raw, None),
        SeriesInput::Fractional => match frac.await {
            Ok(ffd) => (ffd.differenced, SeriesInput::Fractional, Some(ffd.order)),
            Err(e) => {
                log::debug!("{}: differenced input unavailable ({}), using raw series", symbol, e);
                (raw, SeriesInput::Raw, None)
            }
        },
    }
}

/// Fan out every analyzer for one symbol and join their results.
pub async fn run_graph(ctx: GraphContext) -> NodeResults {
    let symbol = ctx.series.symbol.clone();

    let frac: SharedFrac = {
        let ctx = ctx.clone();
        async move {
            let out = ctx
                .node(AnalyzerKind::FractionalDiff, |ctx| async move {
                    let closes = ctx.series.closes().to_vec();
                    let budget = ctx.budget(AnalyzerKind::FractionalDiff);
                    run_blocking(
                        AnalyzerKind::FractionalDiff,
                        ctx.series.symbol.clone(),
                        budget,
                        ctx.request_deadline,
                        move |deadline| {
                            find_min_order(
                                &closes,
                                &ctx.config.analysis.fractional,
                                &ctx.config.analysis.stationarity,
                                deadline,
                            )
                        },
                    )
                    .await
                    .map(NodeOutput::FractionalDiff)
                })
                .await?;
            match out {
                NodeOutput::FractionalDiff(r) => Ok(r),
                other => Err(unexpected(AnalyzerKind::FractionalDiff, other)),
            }
        }
        .boxed()
        .shared()
    };

    let stationarity = {
        let frac = frac.clone();
        ctx.node(AnalyzerKind::Stationarity, move |ctx| async move {
            let cfg = ctx.config.analysis.stationarity.clone();
            let raw = ctx.series.closes().to_vec();
            let (input, used, _) = resolve_input(cfg.input, frac, raw, &ctx.series.symbol).await;
            run_blocking(
                AnalyzerKind::Stationarity,
                ctx.series.symbol.clone(),
                ctx.budget(AnalyzerKind::Stationarity),
                ctx.request_deadline,
                move |_| analyze_stationarity(&input, &cfg, used),
            )
            .await
            .map(NodeOutput::Stationarity)
        })
    };

    let spectral = {
        let frac = frac.clone();
        ctx.node(AnalyzerKind::Spectral, move |ctx| async move {
            let cfg = ctx.config.analysis.spectral.clone();
            let raw = ctx.series.log_returns();
            let (input, used, order) = resolve_input(cfg.input, frac, raw, &ctx.series.symbol).await;
            run_blocking(
                AnalyzerKind::Spectral,
                ctx.series.symbol.clone(),
                ctx.budget(AnalyzerKind::Spectral),
                ctx.request_deadline,
                move |_| analyze_spectrum(&input, order, &cfg, used),
            )
            .await
            .map(NodeOutput::Spectral)
        })
    };

    let volatility = ctx.node(AnalyzerKind::Volatility, |ctx| async move {
        let budget = ctx.budget(AnalyzerKind::Volatility);
        let deadline = ctx.request_deadline;
        let symbol = ctx.series.symbol.clone();
        run_blocking(AnalyzerKind::Volatility, symbol, budget, deadline, move |d| {
            let analysis = &ctx.config.analysis;
            forecast_volatility(&ctx.series, &analysis.volatility, analysis.periods_per_year, d)
        })
        .await
        .map(NodeOutput::Volatility)
    });

    let regime = ctx.node(AnalyzerKind::Regime, |ctx| async move {
        let budget = ctx.budget(AnalyzerKind::Regime);
        let deadline = ctx.request_deadline;
        let symbol = ctx.series.symbol.clone();
        run_blocking(AnalyzerKind::Regime, symbol, budget, deadline, move |d| {
            detect_regimes(&ctx.series.log_returns(), &ctx.config.analysis.regime, d)
        })
        .await
        .map(NodeOutput::Regime)
    });

    let (fractional_diff, stationarity, spectral, volatility, regime) =
        tokio::join!(frac, stationarity, spectral, volatility, regime);

    log::debug!("{}: task graph joined", symbol);

    NodeResults {
        fractional_diff,
        stationarity: stationarity.and_then(|out| match out {
            NodeOutput::Stationarity(r) => Ok(r),
            other => Err(unexpected(AnalyzerKind::Stationarity, other)),
        }),
        spectral: spectral.and_then(|out| match out {
            NodeOutput::Spectral(r) => Ok(r),
            other => Err(unexpected(AnalyzerKind::Spectral, other)),
        }),
        volatility: volatility.and_then(|out| match out {
            NodeOutput::Volatility(r) => Ok(r),
            other => Err(unexpected(AnalyzerKind::Volatility, other)),
        }),
        regime: regime.and_then(|out| match out {
            NodeOutput::Regime(r) => Ok(r),
            other => Err(unexpected(AnalyzerKind::Regime, other)),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_node_times_out_at_its_budget() {
        let far = Instant::now() + Duration::from_secs(60);
        let result: Result<(), _> = run_blocking(
            AnalyzerKind::Regime,
            "SLOW".into(),
            Duration::from_millis(20),
            far,
            |_| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            },
        )
        .await;
        assert!(matches!(result, Err(AnalysisError::Timeout { .. })));
    }

    #[tokio::test]
    async fn request_deadline_clips_the_node_budget() {
        let soon = Instant::now() + Duration::from_millis(10);
        let result = run_blocking(
            AnalyzerKind::Volatility,
            "CLIP".into(),
            Duration::from_secs(60),
            soon,
            |deadline| {
                while !deadline.is_expired() {
                    std::thread::yield_now();
                }
                deadline.check()
            },
        )
        .await;
        assert!(matches!(result, Err(AnalysisError::Timeout { .. })));
    }
}
