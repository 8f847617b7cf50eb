//! Principal components of a cross-section of instruments, and the S-score of each
//! instrument's residual against the leading components.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rayon::prelude::*;

use crate::config::EigenConfig;
use crate::error::AnalysisError;
use crate::models::{EigenportfolioResult, PriceSeries, PrincipalComponent, SScore};
use crate::utils::{log_returns, mean_and_stddev, sample_variance};

/// Log returns of every series restricted to the timestamps they all share.
pub fn aligned_returns(series: &[PriceSeries]) -> Vec<Vec<f64>> {
    let Some(first) = series.first() else {
        return Vec::new();
    };
    let common: BTreeSet<i64> = series.iter().skip(1).fold(
        first.timestamps().iter().copied().collect(),
        |acc, s| {
            let ts: BTreeSet<i64> = s.timestamps().iter().copied().collect();
            acc.intersection(&ts).copied().collect()
        },
    );

    series
        .iter()
        .map(|s| {
            let closes: Vec<f64> = s
                .timestamps()
                .iter()
                .zip(s.closes())
                .filter(|(t, _)| common.contains(t))
                .map(|(_, c)| *c)
                .collect();
            log_returns(&closes)
        })
        .collect()
}

/// Z-scores of every return row (population deviation).
fn standardize(returns: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, AnalysisError> {
    returns
        .par_iter()
        .map(|r| {
            let (mean, std) = mean_and_stddev(r);
            if std < 1e-14 {
                None
            } else {
                Some(r.iter().map(|x| (x - mean) / std).collect())
            }
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| {
            AnalysisError::NumericalDegeneracy("an instrument has zero return variance".into())
        })
}

/// Pearson correlation matrix of standardised rows, one row per instrument.
fn correlation_of(standardized: &[Vec<f64>]) -> DMatrix<f64> {
    let n = standardized.len();
    let len = standardized.first().map_or(0, Vec::len) as f64;
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .map(|j| {
                    let dot: f64 = standardized[i]
                        .iter()
                        .zip(&standardized[j])
                        .map(|(a, b)| a * b)
                        .sum();
                    (dot / len).clamp(-1.0, 1.0)
                })
                .collect()
        })
        .collect();

    DMatrix::from_fn(n, n, |i, j| rows[i][j])
}

/// Regress `returns` on `factors` (with intercept) and standardise the latest residual by
/// the trailing `window` residuals. `None` when the window is not filled or the residual
/// has no dispersion.
pub fn s_score(returns: &[f64], factors: &[Vec<f64>], window: usize) -> Option<SScore> {
    let t = returns.len();
    let k = factors.len();
    if window < 3 || t < window || t <= k + 1 || factors.iter().any(|f| f.len() != t) {
        return None;
    }

    let x = DMatrix::from_fn(t, k + 1, |row, col| if col == 0 { 1.0 } else { factors[col - 1][row] });
    let y = DVector::from_column_slice(returns);
    let beta = x.clone().svd(true, true).solve(&y, 1e-12).ok()?;
    let residuals = &y - &x * &beta;

    let (mean_y, _) = mean_and_stddev(returns);
    let ss_tot: f64 = returns.iter().map(|r| (r - mean_y).powi(2)).sum();
    let ss_res = residuals.norm_squared();
    let r_squared = if ss_tot > 0.0 { (1.0 - ss_res / ss_tot).clamp(0.0, 1.0) } else { 0.0 };

    let tail: Vec<f64> = residuals.as_slice()[t - window..].to_vec();
    let (mean, _) = mean_and_stddev(&tail);
    let deviation = sample_variance(&tail).sqrt();
    let scale = sample_variance(returns).sqrt();
    if !deviation.is_finite() || deviation <= 1e-9 * scale {
        return None;
    }
    let current = (tail[window - 1] - mean) / deviation;

    current.is_finite().then(|| SScore {
        current,
        r_squared,
        betas: beta.iter().skip(1).copied().collect(),
    })
}

/// Eigen-decomposition of the correlation matrix, components sorted by eigenvalue.
pub fn eigenportfolios(
    series: &[PriceSeries],
    top_k: usize,
    config: &EigenConfig,
) -> Result<EigenportfolioResult, AnalysisError> {
    let returns = aligned_returns(series);
    let observations = returns.first().map_or(0, Vec::len);
    let min_observations = config.min_observations.max(2);
    if observations < min_observations {
        return Err(AnalysisError::insufficient(min_observations + 1, observations + 1));
    }

    let standardized = standardize(&returns)?;
    let eigen = SymmetricEigen::new(correlation_of(&standardized));

    let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    // Round-off can leave tiny negative eigenvalues on a singular matrix.
    let eigenvalues: Vec<f64> = order.iter().map(|&i| eigen.eigenvalues[i].max(0.0)).collect();
    let total: f64 = eigenvalues.iter().sum();
    if total <= 0.0 {
        return Err(AnalysisError::NumericalDegeneracy("correlation matrix has no variance".into()));
    }
    let explained: Vec<f64> = eigenvalues.iter().map(|v| v / total).collect();
    let cumulative: Vec<f64> = explained
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect();

    let symbols: Vec<String> = series.iter().map(|s| s.symbol.clone()).collect();

    // Sign-fixed eigenvectors of the top-k components.
    let vectors: Vec<Vec<f64>> = order
        .iter()
        .take(top_k.min(order.len()))
        .map(|&col| {
            let vector = eigen.eigenvectors.column(col);
            let pivot = vector
                .iter()
                .copied()
                .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
            let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
            vector.iter().map(|v| sign * v).collect()
        })
        .collect();

    let components = vectors
        .iter()
        .enumerate()
        .map(|(rank, vector)| {
            let scale = eigenvalues[rank].sqrt();
            let loadings: BTreeMap<String, f64> = symbols
                .iter()
                .zip(vector)
                .map(|(s, v)| (s.clone(), v * scale))
                .collect();
            PrincipalComponent {
                rank: rank + 1,
                eigenvalue: eigenvalues[rank],
                explained_variance_ratio: explained[rank],
                cumulative_variance_ratio: cumulative[rank],
                loadings,
            }
        })
        .collect();

    // Eigenportfolio returns: each component applied to the standardised cross-section.
    let factors: Vec<Vec<f64>> = vectors
        .iter()
        .map(|vector| {
            (0..observations)
                .map(|t| vector.iter().zip(&standardized).map(|(w, z)| w * z[t]).sum())
                .collect()
        })
        .collect();

    let s_scores: BTreeMap<String, SScore> = symbols
        .par_iter()
        .zip(&returns)
        .filter_map(|(symbol, r)| s_score(r, &factors, config.s_score_window).map(|s| (symbol.clone(), s)))
        .collect();

    log::debug!(
        "Eigenportfolios: {} instruments, {} observations, first component explains {:.1}%",
        symbols.len(),
        observations,
        explained.first().copied().unwrap_or(0.0) * 100.0
    );

    Ok(EigenportfolioResult {
        symbols,
        observations,
        eigenvalues,
        explained_variance_ratio: explained,
        cumulative_variance_ratio: cumulative,
        components,
        s_score_window: config.s_score_window,
        s_scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ANALYSIS;
    use crate::data::synthetic;

    fn series(symbol: &str, seed: u64) -> PriceSeries {
        PriceSeries::from_candles(symbol, &synthetic::geometric_brownian(250, 100.0, 0.0, 0.01, seed))
            .unwrap()
    }

    #[test]
    fn ratios_are_ordered_and_sum_to_one() {
        let universe = vec![series("A", 1), series("B", 2), series("C", 3)];
        let result = eigenportfolios(&universe, 2, &ANALYSIS.eigen).unwrap();

        assert_eq!(result.eigenvalues.len(), 3);
        assert!(result.eigenvalues.windows(2).all(|w| w[0] >= w[1]));
        assert!((result.eigenvalues.iter().sum::<f64>() - 3.0).abs() < 1e-9);
        assert!((result.cumulative_variance_ratio[2] - 1.0).abs() < 1e-9);
        assert_eq!(result.components.len(), 2);
        assert_eq!(result.components[0].rank, 1);
    }

    #[test]
    fn duplicated_instrument_loads_on_the_first_component() {
        let a = series("A", 11);
        let mut twin = a.clone();
        twin.symbol = "A2".to_string();
        let universe = vec![a, twin, series("B", 12)];
        let result = eigenportfolios(&universe, 1, &ANALYSIS.eigen).unwrap();

        let first = &result.components[0];
        assert!(first.explained_variance_ratio > 0.6);
        let la = first.loadings["A"];
        let la2 = first.loadings["A2"];
        assert!((la - la2).abs() < 1e-9);
        assert!(la > 0.9, "loading {}", la);
    }

    #[test]
    fn every_instrument_gets_an_s_score_against_fewer_factors() {
        let universe = vec![series("A", 41), series("B", 42), series("C", 43)];
        let result = eigenportfolios(&universe, 1, &ANALYSIS.eigen).unwrap();

        assert_eq!(result.s_score_window, 60);
        assert_eq!(result.s_scores.len(), 3);
        for score in result.s_scores.values() {
            assert!(score.current.is_finite());
            assert!((0.0..=1.0).contains(&score.r_squared));
            assert_eq!(score.betas.len(), 1);
        }
    }

    #[test]
    fn residual_spike_shows_up_as_a_large_s_score() {
        let factor = synthetic::white_noise(200, 0.01, 1);
        let mut noise = synthetic::white_noise(200, 0.001, 2);
        noise[199] += 0.01;
        let asset: Vec<f64> = factor.iter().zip(&noise).map(|(f, e)| 0.5 * f + e).collect();

        let score = s_score(&asset, &[factor], 60).unwrap();
        assert!((score.betas[0] - 0.5).abs() < 0.05, "beta {}", score.betas[0]);
        assert!(score.r_squared > 0.9);
        assert!(score.current > 3.0, "s-score {}", score.current);
    }

    #[test]
    fn s_score_needs_a_full_window_and_residual_dispersion() {
        let factor = synthetic::white_noise(50, 0.01, 3);
        let asset: Vec<f64> = factor.iter().map(|f| 2.0 * f).collect();
        assert!(s_score(&asset, &[factor.clone()], 60).is_none());
        // Perfectly explained returns leave no residual to standardise.
        assert!(s_score(&asset, &[factor], 30).is_none());
    }

    #[test]
    fn alignment_keeps_only_shared_timestamps() {
        let a = series("A", 21);
        let b = a.clone().most_recent(100);
        let returns = aligned_returns(&[a, b]);
        assert_eq!(returns[0].len(), 99);
        assert_eq!(returns[0], returns[1]);
    }

    #[test]
    fn short_overlap_is_insufficient() {
        let a = series("A", 31).most_recent(10);
        let b = series("B", 32).most_recent(10);
        assert!(matches!(
            eigenportfolios(&[a, b], 1, &ANALYSIS.eigen),
            Err(AnalysisError::InsufficientData { .. })
        ));
    }
}
