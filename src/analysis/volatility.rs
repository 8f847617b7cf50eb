//! Volatility forecaster: range-based realized estimators plus a conditional
//! (GARCH-family) model with a sample-volatility fallback.

use crate::analysis::garch::fit_garch;
use crate::config::{VolatilityConfig, VolatilityModel};
use crate::config::constants::volatility::RETURN_SCALE;
use crate::error::AnalysisError;
use crate::models::{PriceSeries, RealizedVolatility, VolatilityModelType, VolatilityResult};
use crate::utils::{Deadline, is_effectively_constant, sample_variance};

/// Parkinson (1980) high-low estimator of per-bar volatility.
pub fn parkinson(highs: &[f64], lows: &[f64]) -> Option<f64> {
    if highs.is_empty() || highs.len() != lows.len() {
        return None;
    }
    let mean_sq = highs
        .iter()
        .zip(lows)
        .map(|(h, l)| (h / l).ln().powi(2))
        .sum::<f64>()
        / highs.len() as f64;
    Some((mean_sq / (4.0 * 2.0_f64.ln())).sqrt())
}

/// Garman-Klass (1980) open-high-low-close estimator of per-bar volatility.
pub fn garman_klass(opens: &[f64], highs: &[f64], lows: &[f64], closes: &[f64]) -> Option<f64> {
    let n = opens.len();
    if n == 0 || highs.len() != n || lows.len() != n || closes.len() != n {
        return None;
    }
    let k = 2.0 * 2.0_f64.ln() - 1.0;
    let variance = (0..n)
        .map(|i| {
            let hl = (highs[i] / lows[i]).ln();
            let co = (closes[i] / opens[i]).ln();
            0.5 * hl * hl - k * co * co
        })
        .sum::<f64>()
        / n as f64;
    // The estimator can dip below zero on bars with tiny ranges.
    Some(variance.max(0.0).sqrt())
}

/// Annualised estimators over the trailing `window` bars.
pub fn realized_volatility(series: &PriceSeries, window: usize, periods_per_year: f64) -> RealizedVolatility {
    let n = series.len();
    let annual = periods_per_year.sqrt();
    if n < 2 || window == 0 {
        return RealizedVolatility::default();
    }
    let start = n.saturating_sub(window);
    let returns = series.log_returns();
    let tail_returns = &returns[returns.len().saturating_sub(window)..];

    let close_to_close = (tail_returns.len() >= 2).then(|| sample_variance(tail_returns).sqrt() * annual);
    let parkinson = parkinson(&series.highs()[start..], &series.lows()[start..]).map(|v| v * annual);
    let garman_klass = garman_klass(
        &series.opens()[start..],
        &series.highs()[start..],
        &series.lows()[start..],
        &series.closes()[start..],
    )
    .map(|v| v * annual);

    RealizedVolatility {
        close_to_close,
        parkinson,
        garman_klass,
    }
}

/// Fit the configured conditional model and forecast `config.horizon` bars ahead.
///
/// A diverged fit is not an error here: the result falls back to the unconditional sample
/// volatility and carries the reason in `degraded`.
pub fn forecast_volatility(
    series: &PriceSeries,
    config: &VolatilityConfig,
    periods_per_year: f64,
    deadline: &Deadline,
) -> Result<VolatilityResult, AnalysisError> {
    let returns = series.log_returns();
    if returns.len() < config.min_returns {
        return Err(AnalysisError::insufficient(config.min_returns + 1, series.len()));
    }
    if is_effectively_constant(&returns) {
        return Err(AnalysisError::NumericalDegeneracy(
            "returns have zero variance".into(),
        ));
    }

    let realized = realized_volatility(series, config.realized_window, periods_per_year);
    let annual = periods_per_year.sqrt();
    let scaled: Vec<f64> = returns.iter().map(|r| r * RETURN_SCALE).collect();

    match fit_garch(&scaled, config.model, config.max_iter, deadline) {
        Ok(fit) => {
            let last_var = fit.conditional_variance.last().copied().unwrap_or(0.0);
            let current = last_var.sqrt() / RETURN_SCALE;
            let forecasted_volatility = fit
                .forecast_variance(config.horizon)
                .into_iter()
                .map(|v| v.max(0.0).sqrt() / RETURN_SCALE)
                .collect();

            Ok(VolatilityResult {
                model_type: match config.model {
                    VolatilityModel::Garch => VolatilityModelType::Garch,
                    VolatilityModel::GjrGarch => VolatilityModelType::GjrGarch,
                },
                current_volatility: current,
                annualized_volatility: current * annual,
                forecasted_volatility,
                parameters: fit.params.to_map(config.model, fit.mu / RETURN_SCALE),
                log_likelihood: Some(fit.log_likelihood),
                aic: Some(fit.aic()),
                bic: Some(fit.bic()),
                persistence: Some(fit.params.persistence()),
                half_life: fit.params.half_life(),
                realized,
                degraded: None,
            })
        }
        Err(AnalysisError::ModelDivergence(reason)) => {
            log::warn!(
                "{}: {} diverged ({}), falling back to sample volatility",
                series.symbol,
                config.model,
                reason
            );
            Ok(sample_fallback(&returns, config.horizon, annual, realized, reason))
        }
        Err(e) => Err(e),
    }
}

pub(crate) fn sample_fallback(
    returns: &[f64],
    horizon: usize,
    annual: f64,
    realized: RealizedVolatility,
    reason: String,
) -> VolatilityResult {
    let sigma = sample_variance(returns).sqrt();
    VolatilityResult {
        model_type: VolatilityModelType::Sample,
        current_volatility: sigma,
        annualized_volatility: sigma * annual,
        forecasted_volatility: vec![sigma; horizon],
        parameters: Default::default(),
        log_likelihood: None,
        aic: None,
        bic: None,
        persistence: None,
        half_life: None,
        realized,
        degraded: Some(reason),
    }
}
