//! Unit-root testing: Augmented Dickey-Fuller with a KPSS cross-check.
//!
//! ADF (null: unit root) and KPSS (null: level stationarity) are reported side by side.
//! The reconciled [`StationarityVerdict`] is what the synthesizer votes on.

use nalgebra::{DMatrix, DVector};
use statrs::function::erf::erfc;

use crate::config::constants::stationarity::{STATISTIC_CAP, kpss};
use crate::config::{SeriesInput, StationarityConfig};
use crate::error::AnalysisError;
use crate::models::{CriticalValues, StationarityResult, StationarityVerdict};
use crate::utils::{is_effectively_constant, remap};

/// Relative singular-value cut-off below which a regression design is rank deficient.
const RANK_TOLERANCE: f64 = 1e-10;

/// Residual sum of squares (relative to the squared response) treated as an exact fit.
const EXACT_FIT_TOLERANCE: f64 = 1e-20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdfOutcome {
    pub statistic: f64,
    pub pvalue: f64,
    pub used_lag: usize,
    pub nobs: usize,
    pub critical_values: CriticalValues,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KpssOutcome {
    pub statistic: f64,
    pub pvalue: f64,
    pub lags: usize,
}

/// Run ADF (and KPSS when configured) on `series`.
pub fn analyze_stationarity(
    series: &[f64],
    config: &StationarityConfig,
    input: SeriesInput,
) -> Result<StationarityResult, AnalysisError> {
    if series.len() < config.min_length {
        return Err(AnalysisError::insufficient(config.min_length, series.len()));
    }

    let adf = adf_test(series, config.max_lag)?;
    let is_stationary = adf.pvalue < config.significance.value();

    let kpss = if config.run_kpss {
        match kpss_test(series) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::debug!("KPSS skipped: {}", e);
                None
            }
        }
    } else {
        None
    };

    let verdict = reconcile(
        is_stationary,
        kpss.map(|k| k.pvalue < config.kpss_significance.value()),
    );

    Ok(StationarityResult {
        adf_statistic: adf.statistic,
        adf_pvalue: adf.pvalue,
        is_stationary,
        kpss_statistic: kpss.map(|k| k.statistic),
        kpss_pvalue: kpss.map(|k| k.pvalue),
        adf_used_lag: adf.used_lag,
        adf_nobs: adf.nobs,
        adf_critical_values: adf.critical_values,
        kpss_lags: kpss.map(|k| k.lags),
        verdict,
        input,
    })
}

/// Combine the ADF decision with the KPSS rejection flag (if KPSS ran).
pub fn reconcile(adf_stationary: bool, kpss_rejects: Option<bool>) -> StationarityVerdict {
    match (adf_stationary, kpss_rejects) {
        (true, None | Some(false)) => StationarityVerdict::Stationary,
        (false, None | Some(true)) => StationarityVerdict::NonStationary,
        _ => StationarityVerdict::Inconclusive,
    }
}

/// Augmented Dickey-Fuller test with a constant term.
///
/// Regression: `dy_t = a + g * y_{t-1} + sum(phi_i * dy_{t-i}) + e_t`. The lag order is
/// picked by AIC over `0..=max_lag` on a common sample, then the chosen model is refit on
/// every usable observation.
pub fn adf_test(series: &[f64], max_lag: Option<usize>) -> Result<AdfOutcome, AnalysisError> {
    let n = series.len();
    if n < 6 {
        return Err(AnalysisError::insufficient(6, n));
    }
    if is_effectively_constant(series) {
        return Err(AnalysisError::NumericalDegeneracy(
            "series is constant, ADF statistic undefined".into(),
        ));
    }

    let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    let max_lag = max_lag.unwrap_or(schwert).min((n / 2).saturating_sub(2));

    let mut best: Option<(usize, f64)> = None;
    for lag in 0..=max_lag {
        let Some(fit) = adf_regression(series, &diffs, lag, max_lag) else {
            continue;
        };
        let k = (lag + 2) as f64;
        let nobs = fit.nobs as f64;
        let aic = nobs * (fit.ssr / nobs).ln() + 2.0 * k;
        if best.is_none_or(|(_, best_aic)| aic < best_aic) {
            best = Some((lag, aic));
        }
    }

    let (used_lag, _) = best.ok_or_else(|| {
        AnalysisError::NumericalDegeneracy("every ADF design matrix was rank deficient".into())
    })?;

    let fit = adf_regression(series, &diffs, used_lag, used_lag).ok_or_else(|| {
        AnalysisError::NumericalDegeneracy("ADF refit was rank deficient".into())
    })?;

    let statistic = fit.statistic();
    Ok(AdfOutcome {
        statistic,
        pvalue: mackinnon_pvalue(statistic),
        used_lag,
        nobs: fit.nobs,
        critical_values: adf_critical_values(fit.nobs),
    })
}

struct AdfFit {
    gamma: f64,
    se_gamma: f64,
    ssr: f64,
    response_ss: f64,
    nobs: usize,
}

impl AdfFit {
    fn statistic(&self) -> f64 {
        // An exact fit is a deterministic path: decaying toward a level is stationary,
        // anything else behaves like a unit root.
        if self.ssr <= EXACT_FIT_TOLERANCE * self.response_ss {
            return if self.gamma < -1e-8 {
                -STATISTIC_CAP
            } else {
                STATISTIC_CAP
            };
        }
        let t = self.gamma / self.se_gamma;
        if t.is_finite() {
            t
        } else {
            self.gamma.signum() * STATISTIC_CAP
        }
    }
}

/// OLS for one lag order. Rows start at `first_row` (in `diffs` indices) so that
/// several lag orders can share a sample. `None` when the design is rank deficient.
fn adf_regression(series: &[f64], diffs: &[f64], lag: usize, first_row: usize) -> Option<AdfFit> {
    let first_row = first_row.max(lag);
    let nobs = diffs.len().checked_sub(first_row)?;
    let k = lag + 2;
    if nobs <= k {
        return None;
    }

    let x = DMatrix::from_fn(nobs, k, |row, col| {
        let t = first_row + row;
        match col {
            0 => 1.0,
            1 => series[t],
            c => diffs[t - (c - 1)],
        }
    });
    let y = DVector::from_iterator(nobs, diffs[first_row..].iter().copied());

    let singular = x.clone().svd(false, false).singular_values;
    let s_max = singular.max();
    if singular.iter().filter(|s| **s > s_max * RANK_TOLERANCE).count() < k {
        return None;
    }

    let xt = x.transpose();
    let xtx_inv = (&xt * &x).try_inverse()?;
    let beta = &xtx_inv * (&xt * &y);
    let residuals = &y - &x * &beta;
    let ssr = residuals.norm_squared();
    let sigma2 = ssr / (nobs - k) as f64;

    Some(AdfFit {
        gamma: beta[1],
        se_gamma: (sigma2 * xtx_inv[(1, 1)]).sqrt(),
        ssr,
        response_ss: y.norm_squared(),
        nobs,
    })
}

/// MacKinnon (1994) approximate p-value for the constant-only, single-series case.
pub fn mackinnon_pvalue(statistic: f64) -> f64 {
    const TAU_MAX: f64 = 2.74;
    const TAU_MIN: f64 = -18.83;
    const TAU_STAR: f64 = -1.61;
    const SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
    const LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

    if statistic.is_nan() {
        return 1.0;
    }
    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }
    let coeffs: &[f64] = if statistic <= TAU_STAR {
        &SMALL_P
    } else {
        &LARGE_P
    };
    let z = coeffs
        .iter()
        .rev()
        .fold(0.0, |acc, c| acc * statistic + c);
    standard_normal_cdf(z).clamp(0.0, 1.0)
}

/// MacKinnon (2010) finite-sample critical values, constant-only regression.
pub fn adf_critical_values(nobs: usize) -> CriticalValues {
    let t = nobs.max(1) as f64;
    let surface = |b: [f64; 4]| b[0] + b[1] / t + b[2] / t.powi(2) + b[3] / t.powi(3);
    CriticalValues {
        one_pct: surface([-3.43035, -6.5393, -16.786, -79.433]),
        five_pct: surface([-2.86154, -2.8903, -4.234, -40.040]),
        ten_pct: surface([-2.56677, -1.5384, -2.809, 0.0]),
    }
}

fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// KPSS level-stationarity test with a Bartlett-kernel long-run variance.
pub fn kpss_test(series: &[f64]) -> Result<KpssOutcome, AnalysisError> {
    let n = series.len();
    if n < 3 {
        return Err(AnalysisError::insufficient(3, n));
    }
    let mean = series.iter().sum::<f64>() / n as f64;
    let residuals: Vec<f64> = series.iter().map(|x| x - mean).collect();

    let mut partial = 0.0;
    let eta = residuals
        .iter()
        .map(|e| {
            partial += e;
            partial * partial
        })
        .sum::<f64>()
        / (n as f64).powi(2);

    let lags = ((12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize).min(n - 1);
    let mut long_run = residuals.iter().map(|e| e * e).sum::<f64>();
    for k in 1..=lags {
        let bartlett = 1.0 - k as f64 / (lags as f64 + 1.0);
        let autocov: f64 = residuals[k..]
            .iter()
            .zip(&residuals[..n - k])
            .map(|(a, b)| a * b)
            .sum();
        long_run += 2.0 * bartlett * autocov;
    }
    long_run /= n as f64;

    if long_run <= 0.0 || !long_run.is_finite() {
        return Err(AnalysisError::NumericalDegeneracy(
            "non-positive long-run variance".into(),
        ));
    }

    let statistic = eta / long_run;
    Ok(KpssOutcome {
        statistic,
        pvalue: kpss_pvalue(statistic),
        lags,
    })
}

/// Linear interpolation in the KPSS table, bounded to [0.01, 0.10].
pub fn kpss_pvalue(statistic: f64) -> f64 {
    let crit = kpss::CRITICAL_VALUES;
    let pvals = kpss::P_VALUES;
    if statistic <= crit[0] {
        return pvals[0];
    }
    if statistic >= crit[crit.len() - 1] {
        return pvals[pvals.len() - 1];
    }
    let i = crit.iter().rposition(|c| *c <= statistic).unwrap_or(0);
    remap(statistic, crit[i], crit[i + 1], pvals[i], pvals[i + 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ANALYSIS;
    use crate::data::synthetic;

    #[test]
    fn white_noise_is_stationary() {
        let noise = synthetic::white_noise(400, 1.0, 11);
        let result = analyze_stationarity(&noise, &ANALYSIS.stationarity, SeriesInput::Raw).unwrap();
        assert!(result.adf_pvalue < 0.01, "p = {}", result.adf_pvalue);
        assert!(result.is_stationary);
        assert_eq!(result.verdict, StationarityVerdict::Stationary);
    }

    #[test]
    fn drifting_random_walk_is_not_stationary() {
        let walk = synthetic::random_walk(300, 0.5, 1.0, 5);
        let result = analyze_stationarity(&walk, &ANALYSIS.stationarity, SeriesInput::Raw).unwrap();
        assert!(!result.is_stationary, "p = {}", result.adf_pvalue);
        assert_eq!(result.kpss_pvalue, Some(0.01));
        assert_eq!(result.verdict, StationarityVerdict::NonStationary);
    }

    #[test]
    fn exponential_growth_is_a_unit_root_with_unit_pvalue() {
        let prices: Vec<f64> = (0..300).map(|i| 100.0 * 1.003f64.powi(i)).collect();
        let adf = adf_test(&prices, None).unwrap();
        assert!(adf.statistic > 0.0);
        assert_eq!(adf.pvalue, 1.0);
    }

    #[test]
    fn constant_and_short_series_fail_cleanly() {
        let flat = vec![42.0; 50];
        assert!(matches!(
            analyze_stationarity(&flat, &ANALYSIS.stationarity, SeriesInput::Raw),
            Err(AnalysisError::NumericalDegeneracy(_))
        ));
        assert_eq!(
            analyze_stationarity(&flat[..15], &ANALYSIS.stationarity, SeriesInput::Raw),
            Err(AnalysisError::InsufficientData { required: 20, actual: 15 })
        );
    }

    #[test]
    fn pvalue_stays_in_unit_interval_and_is_monotone() {
        let mut last = 0.0;
        for i in 0..=300 {
            let stat = -25.0 + i as f64 * 0.1;
            let p = mackinnon_pvalue(stat);
            assert!((0.0..=1.0).contains(&p));
            assert!(p + 1e-9 >= last, "p dropped at {}", stat);
            last = p;
        }
        assert!((mackinnon_pvalue(-3.43) - 0.01).abs() < 0.002);
        assert!((mackinnon_pvalue(-2.86) - 0.05).abs() < 0.005);
    }

    #[test]
    fn critical_values_approach_asymptotic_limits() {
        let cv = adf_critical_values(100_000);
        assert!((cv.one_pct + 3.43035).abs() < 1e-3);
        assert!((cv.five_pct + 2.86154).abs() < 1e-3);
        assert!(cv.one_pct < cv.five_pct && cv.five_pct < cv.ten_pct);
    }

    #[test]
    fn kpss_pvalue_interpolates_between_table_points() {
        assert_eq!(kpss_pvalue(0.1), 0.10);
        assert_eq!(kpss_pvalue(5.0), 0.01);
        assert!((kpss_pvalue(0.463) - 0.05).abs() < 1e-12);
        let mid = kpss_pvalue(0.405);
        assert!(mid < 0.10 && mid > 0.05);
    }

    #[test]
    fn reconcile_covers_disagreement() {
        assert_eq!(reconcile(true, Some(true)), StationarityVerdict::Inconclusive);
        assert_eq!(reconcile(false, Some(false)), StationarityVerdict::Inconclusive);
        assert_eq!(reconcile(true, None), StationarityVerdict::Stationary);
        assert_eq!(reconcile(false, None), StationarityVerdict::NonStationary);
    }
}
