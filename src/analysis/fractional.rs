//! Fixed-width fractional differencing (FFD) and the minimal-order search.

use crate::analysis::stationarity::adf_test;
use crate::config::{FractionalConfig, StationarityConfig};
use crate::error::AnalysisError;
use crate::models::FractionalDiffResult;
use crate::utils::Deadline;

/// Binomial-series weights `w_0 = 1, w_k = -w_{k-1} * (d - k + 1) / k`, truncated once a
/// weight drops below `threshold` in magnitude or the filter reaches `max_width`.
pub fn ffd_weights(d: f64, threshold: f64, max_width: usize) -> Vec<f64> {
    let mut weights = vec![1.0];
    let mut k = 1usize;
    while weights.len() < max_width.max(1) {
        let prev = weights[weights.len() - 1];
        let next = -prev * (d - k as f64 + 1.0) / k as f64;
        if next.abs() < threshold {
            break;
        }
        weights.push(next);
        k += 1;
    }
    weights
}

/// Apply the filter: `out_t = sum_k w_k * x_{t-k}` for every `t` with a full window.
/// The output is `series.len() - weights.len() + 1` long.
pub fn frac_diff(series: &[f64], weights: &[f64]) -> Vec<f64> {
    let width = weights.len();
    if width == 0 || series.len() < width {
        return Vec::new();
    }
    (width - 1..series.len())
        .map(|t| {
            weights
                .iter()
                .enumerate()
                .map(|(k, w)| w * series[t - k])
                .sum()
        })
        .collect()
}

/// Search `d = 0, step, 2*step, ..` and return the first order whose FFD series passes ADF.
///
/// The grid is fixed by configuration so the chosen order is reproducible. At `d = 0` the
/// filter is the identity, so an already stationary input comes back unchanged.
pub fn find_min_order(
    series: &[f64],
    config: &FractionalConfig,
    stationarity: &StationarityConfig,
    deadline: &Deadline,
) -> Result<FractionalDiffResult, AnalysisError> {
    if series.len() < config.min_length {
        return Err(AnalysisError::insufficient(config.min_length, series.len()));
    }

    let max_width = ((series.len() as f64 * config.max_window_fraction).floor() as usize).max(1);
    let significance = stationarity.significance.value();
    for d in config.orders() {
        deadline.check()?;

        let weights = ffd_weights(d, config.weight_threshold, max_width);
        let differenced = frac_diff(series, &weights);
        if differenced.len() < stationarity.min_length {
            continue;
        }

        match adf_test(&differenced, stationarity.max_lag) {
            Ok(adf) if adf.pvalue < significance => {
                log::debug!(
                    "FFD: d = {:.2} passes ADF (p = {:.4}, width {})",
                    d,
                    adf.pvalue,
                    weights.len()
                );
                return Ok(FractionalDiffResult {
                    order: d,
                    adf_pvalue: adf.pvalue,
                    window: weights.len(),
                    differenced,
                });
            }
            Ok(_) => {}
            Err(e) => log::debug!("FFD: d = {:.2} skipped: {}", d, e),
        }
    }

    Err(AnalysisError::NoStationaryOrderFound {
        max_order: config.max_order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ANALYSIS;
    use crate::data::synthetic;

    #[test]
    fn order_zero_weights_are_the_identity() {
        assert_eq!(ffd_weights(0.0, 1e-4, 100), vec![1.0]);
        let series = [3.0, 1.0, 4.0, 1.0, 5.0];
        assert_eq!(frac_diff(&series, &[1.0]), series.to_vec());
    }

    #[test]
    fn order_one_is_the_first_difference() {
        let weights = ffd_weights(1.0, 1e-4, 100);
        assert_eq!(weights, vec![1.0, -1.0]);
        assert_eq!(frac_diff(&[1.0, 3.0, 6.0], &weights), vec![2.0, 3.0]);
    }

    #[test]
    fn fractional_weights_decay_and_respect_the_width_cap() {
        let weights = ffd_weights(0.4, 1e-4, 1_000);
        assert!((weights[1] + 0.4).abs() < 1e-12);
        assert!(weights.windows(2).skip(1).all(|w| w[1].abs() < w[0].abs()));
        assert!(weights.last().unwrap().abs() >= 1e-4);
        assert_eq!(ffd_weights(0.4, 1e-4, 10).len(), 10);
    }

    #[test]
    fn stationary_input_returns_order_zero_unchanged() {
        let series: Vec<f64> = synthetic::white_noise(300, 1.0, 3)
            .into_iter()
            .map(|x| 100.0 + x)
            .collect();
        let result = find_min_order(
            &series,
            &ANALYSIS.fractional,
            &ANALYSIS.stationarity,
            &Deadline::unbounded(),
        )
        .unwrap();
        assert_eq!(result.order, 0.0);
        assert_eq!(result.differenced, series);
        assert_eq!(result.window, 1);
    }

    #[test]
    fn random_walk_needs_a_positive_order_and_is_reproducible() {
        let walk: Vec<f64> = synthetic::random_walk(400, 0.5, 1.0, 21)
            .into_iter()
            .map(|x| 200.0 + x)
            .collect();
        let run = || {
            find_min_order(
                &walk,
                &ANALYSIS.fractional,
                &ANALYSIS.stationarity,
                &Deadline::unbounded(),
            )
        };
        let first = run().unwrap();
        let second = run().unwrap();
        assert!(first.order > 0.0 && first.order <= 1.0);
        assert_eq!(first.order, second.order);
        assert!(first.adf_pvalue < 0.05);
    }

    #[test]
    fn short_series_and_expired_deadline_fail() {
        let series = vec![1.0; 10];
        assert!(matches!(
            find_min_order(&series, &ANALYSIS.fractional, &ANALYSIS.stationarity, &Deadline::unbounded()),
            Err(AnalysisError::InsufficientData { .. })
        ));
        let walk = synthetic::random_walk(200, 0.0, 1.0, 2);
        let expired = Deadline::after(std::time::Duration::ZERO);
        assert!(matches!(
            find_min_order(&walk, &ANALYSIS.fractional, &ANALYSIS.stationarity, &expired),
            Err(AnalysisError::Timeout { .. })
        ));
    }
}
