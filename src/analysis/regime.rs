//! Latent market regimes from a 1-D Gaussian hidden Markov model.
//!
//! Every state count from `min_states` to `n_states` is fitted and the lowest BIC wins, so
//! a homogeneous stretch is not split into spurious states. Fitting indices are arbitrary,
//! so after Baum-Welch the states are re-indexed by ascending variance (ties by mean) and
//! labelled from their parameters alone.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::config::constants::regime::RETURN_SCALE;
use crate::config::{DEBUG_FLAGS, RegimeConfig};
use crate::error::AnalysisError;
use crate::models::{RegimeDirection, RegimeResult, RegimeState, RegimeStatistics, VolatilityTier};
use crate::utils::{Deadline, argmax, is_effectively_constant, mean_and_stddev, sample_variance};

#[derive(Debug, Clone, PartialEq)]
pub struct GaussianHmm {
    pub initial: Vec<f64>,
    pub transition: Vec<Vec<f64>>,
    pub means: Vec<f64>,
    pub variances: Vec<f64>,
}

/// Scaled forward pass. `alpha[t]` sums to one; the log-likelihood is exact.
struct Forward {
    alpha: Vec<Vec<f64>>,
    scales: Vec<f64>,
    /// Per-observation emissions divided by their row maximum.
    emissions: Vec<Vec<f64>>,
    log_likelihood: f64,
}

impl GaussianHmm {
    pub fn n_states(&self) -> usize {
        self.means.len()
    }

    /// Deterministic start: state `k` takes the moments of the `k`-th contiguous time block.
    fn from_blocks(obs: &[f64], n_states: usize, variance_floor: f64) -> Self {
        let block = obs.len() / n_states;
        let (means, variances) = (0..n_states)
            .map(|k| {
                let end = if k + 1 == n_states { obs.len() } else { (k + 1) * block };
                let (mean, std) = mean_and_stddev(&obs[k * block..end]);
                (mean, (std * std).max(variance_floor))
            })
            .unzip();

        let transition = (0..n_states)
            .map(|i| {
                (0..n_states)
                    .map(|j| match (n_states, i == j) {
                        (1, _) => 1.0,
                        (_, true) => 0.9,
                        (n, false) => 0.1 / (n - 1) as f64,
                    })
                    .collect()
            })
            .collect();

        Self {
            initial: vec![1.0 / n_states as f64; n_states],
            transition,
            means,
            variances,
        }
    }

    fn log_emission(&self, state: usize, x: f64) -> f64 {
        let var = self.variances[state];
        let diff = x - self.means[state];
        -0.5 * ((2.0 * PI * var).ln() + diff * diff / var)
    }

    fn forward(&self, obs: &[f64]) -> Result<Forward, AnalysisError> {
        let n = self.n_states();
        let mut alpha = Vec::with_capacity(obs.len());
        let mut scales = Vec::with_capacity(obs.len());
        let mut emissions = Vec::with_capacity(obs.len());
        let mut log_likelihood = 0.0;

        for (t, &x) in obs.iter().enumerate() {
            let logs: Vec<f64> = (0..n).map(|i| self.log_emission(i, x)).collect();
            let peak = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let b: Vec<f64> = logs.iter().map(|l| (l - peak).exp()).collect();

            let mut a: Vec<f64> = (0..n)
                .map(|j| {
                    let prior = if t == 0 {
                        self.initial[j]
                    } else {
                        let prev: &Vec<f64> = &alpha[t - 1];
                        (0..n).map(|i| prev[i] * self.transition[i][j]).sum()
                    };
                    prior * b[j]
                })
                .collect();

            let c: f64 = a.iter().sum();
            if c <= 0.0 || !c.is_finite() || !peak.is_finite() {
                return Err(AnalysisError::ModelFitFailure(format!(
                    "observation {} has zero likelihood under every state",
                    t
                )));
            }
            a.iter_mut().for_each(|v| *v /= c);
            log_likelihood += c.ln() + peak;

            alpha.push(a);
            scales.push(c);
            emissions.push(b);
        }

        Ok(Forward {
            alpha,
            scales,
            emissions,
            log_likelihood,
        })
    }

    fn backward(&self, fwd: &Forward) -> Vec<Vec<f64>> {
        let n = self.n_states();
        let len = fwd.alpha.len();
        let mut beta = vec![vec![1.0; n]; len];
        for t in (0..len.saturating_sub(1)).rev() {
            let next_b = &fwd.emissions[t + 1];
            let c = fwd.scales[t + 1];
            for i in 0..n {
                beta[t][i] = (0..n)
                    .map(|j| self.transition[i][j] * next_b[j] * beta[t + 1][j])
                    .sum::<f64>()
                    / c;
            }
        }
        beta
    }

    /// One Baum-Welch update. Returns the log-likelihood of the parameters *before* the update.
    fn em_step(&mut self, obs: &[f64], variance_floor: f64) -> Result<f64, AnalysisError> {
        let n = self.n_states();
        let fwd = self.forward(obs)?;
        let beta = self.backward(&fwd);
        let len = obs.len();

        let gamma: Vec<Vec<f64>> = (0..len)
            .map(|t| {
                let row: Vec<f64> = (0..n).map(|i| fwd.alpha[t][i] * beta[t][i]).collect();
                let total: f64 = row.iter().sum();
                row.into_iter().map(|g| g / total).collect()
            })
            .collect();

        let mut xi_sum = vec![vec![0.0; n]; n];
        for t in 0..len.saturating_sub(1) {
            let c = fwd.scales[t + 1];
            for i in 0..n {
                for j in 0..n {
                    xi_sum[i][j] += fwd.alpha[t][i]
                        * self.transition[i][j]
                        * fwd.emissions[t + 1][j]
                        * beta[t + 1][j]
                        / c;
                }
            }
        }

        for i in 0..n {
            let occupancy: f64 = gamma.iter().map(|g| g[i]).sum();
            if occupancy < 1e-10 || !occupancy.is_finite() {
                return Err(AnalysisError::ModelFitFailure(format!(
                    "state {} collapsed (degenerate covariance)",
                    i
                )));
            }
            let mean = gamma.iter().zip(obs).map(|(g, x)| g[i] * x).sum::<f64>() / occupancy;
            let var = gamma
                .iter()
                .zip(obs)
                .map(|(g, x)| g[i] * (x - mean).powi(2))
                .sum::<f64>()
                / occupancy;
            self.means[i] = mean;
            self.variances[i] = var.max(variance_floor);

            let row_total: f64 = xi_sum[i].iter().sum();
            if row_total > 0.0 {
                for j in 0..n {
                    self.transition[i][j] = xi_sum[i][j] / row_total;
                }
            }
            self.initial[i] = gamma[0][i];
        }

        Ok(fwd.log_likelihood)
    }

    /// Posterior over states for the final observation.
    pub fn last_posterior(&self, obs: &[f64]) -> Result<Vec<f64>, AnalysisError> {
        let fwd = self.forward(obs)?;
        fwd.alpha
            .last()
            .cloned()
            .ok_or_else(|| AnalysisError::ModelFitFailure("empty observation sequence".into()))
    }

    /// Most likely state sequence, computed in log space.
    pub fn viterbi(&self, obs: &[f64]) -> Vec<usize> {
        let n = self.n_states();
        if obs.is_empty() || n == 0 {
            return Vec::new();
        }
        let log_a: Vec<Vec<f64>> = self
            .transition
            .iter()
            .map(|row| row.iter().map(|p| p.ln()).collect())
            .collect();

        let mut delta: Vec<f64> = (0..n)
            .map(|j| self.initial[j].ln() + self.log_emission(j, obs[0]))
            .collect();
        let mut back: Vec<Vec<usize>> = Vec::with_capacity(obs.len());

        for &x in &obs[1..] {
            let mut next = vec![f64::NEG_INFINITY; n];
            let mut from = vec![0; n];
            for j in 0..n {
                for i in 0..n {
                    let score = delta[i] + log_a[i][j];
                    if score > next[j] {
                        next[j] = score;
                        from[j] = i;
                    }
                }
                next[j] += self.log_emission(j, x);
            }
            back.push(from);
            delta = next;
        }

        let mut state = (0..n)
            .max_by(|&a, &b| delta[a].total_cmp(&delta[b]).then(b.cmp(&a)))
            .unwrap_or(0);
        let mut path = vec![state; obs.len()];
        for (t, from) in back.iter().enumerate().rev() {
            state = from[state];
            path[t] = state;
        }
        path
    }

    /// Free parameters: initial distribution, transition rows, one mean and variance per state.
    pub fn parameter_count(n_states: usize) -> usize {
        let n = n_states.max(1);
        (n - 1) + n * (n - 1) + 2 * n
    }

    /// Re-index states by ascending variance, then ascending mean.
    fn canonical(self) -> Self {
        let n = self.n_states();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            self.variances[a]
                .total_cmp(&self.variances[b])
                .then(self.means[a].total_cmp(&self.means[b]))
        });
        Self {
            initial: order.iter().map(|&i| self.initial[i]).collect(),
            transition: order
                .iter()
                .map(|&i| order.iter().map(|&j| self.transition[i][j]).collect())
                .collect(),
            means: order.iter().map(|&i| self.means[i]).collect(),
            variances: order.iter().map(|&i| self.variances[i]).collect(),
        }
    }

    /// Long-run state occupancy by power iteration on the transition matrix.
    pub fn stationary_distribution(&self) -> Vec<f64> {
        let n = self.n_states();
        let mut dist = vec![1.0 / n as f64; n];
        for _ in 0..10_000 {
            let next: Vec<f64> = (0..n)
                .map(|j| (0..n).map(|i| dist[i] * self.transition[i][j]).sum())
                .collect();
            let delta: f64 = next.iter().zip(&dist).map(|(a, b)| (a - b).abs()).sum();
            dist = next;
            if delta < 1e-13 {
                break;
            }
        }
        dist
    }
}

/// Fit an `n_states` HMM on returns (scaled to percent) with Baum-Welch.
pub fn fit_hmm(
    obs: &[f64],
    n_states: usize,
    config: &RegimeConfig,
    deadline: &Deadline,
) -> Result<(GaussianHmm, f64, usize), AnalysisError> {
    if n_states == 0 {
        return Err(AnalysisError::ModelFitFailure("n_states must be positive".into()));
    }
    if is_effectively_constant(obs) {
        return Err(AnalysisError::ModelFitFailure(
            "degenerate covariance: returns have zero variance".into(),
        ));
    }
    let (_, std) = mean_and_stddev(obs);
    let variance_floor = std * std * config.variance_floor_ratio;

    let mut model = GaussianHmm::from_blocks(obs, n_states, variance_floor);
    let mut previous: Option<f64> = None;

    for iteration in 0..config.max_iter {
        deadline.check()?;
        let candidate_before = model.clone();
        let ll = model.em_step(obs, variance_floor)?;
        if !ll.is_finite() {
            return Err(AnalysisError::ModelFitFailure("log-likelihood is not finite".into()));
        }
        if DEBUG_FLAGS.log_fit_iterations {
            log::debug!("HMM({}) iteration {}: log-likelihood {:.6}", n_states, iteration, ll);
        }
        if let Some(prev) = previous {
            if (ll - prev).abs() <= config.tolerance * prev.abs().max(1.0) {
                // `ll` belongs to the parameters in place before this update.
                return Ok((candidate_before, ll, iteration + 1));
            }
        }
        previous = Some(ll);
    }

    Err(AnalysisError::ModelFitFailure(format!(
        "EM did not converge within {} iterations",
        config.max_iter
    )))
}

/// Regime detection on a log-return series.
pub fn detect_regimes(
    returns: &[f64],
    config: &RegimeConfig,
    deadline: &Deadline,
) -> Result<RegimeResult, AnalysisError> {
    let required = config.min_returns.max(2 * config.n_states);
    if returns.len() < required {
        return Err(AnalysisError::insufficient(required + 1, returns.len() + 1));
    }

    let obs: Vec<f64> = returns.iter().map(|r| r * RETURN_SCALE).collect();
    let selected = select_by_bic(&obs, config, deadline)?;
    let model = selected.model.canonical();

    let mut posterior = model.last_posterior(&obs)?;
    let total: f64 = posterior.iter().sum();
    posterior.iter_mut().for_each(|p| *p /= total);
    let current_regime = argmax(&posterior)
        .ok_or_else(|| AnalysisError::ModelFitFailure("empty posterior".into()))?;

    let stationary = model.stationary_distribution();
    let n = model.n_states();
    let states: Vec<RegimeState> = (0..n)
        .map(|i| {
            let tier = volatility_tier(i, n);
            let direction = direction(model.means[i], config.mean_dead_band);
            RegimeState {
                index: i,
                mean: model.means[i],
                variance: model.variances[i],
                stationary_probability: stationary[i],
                tier,
                direction,
                label: format!("{}-Volatility {}", tier, direction),
            }
        })
        .collect();

    let regime_descriptions: BTreeMap<usize, String> =
        states.iter().map(|s| (s.index, s.label.clone())).collect();

    let history = model.viterbi(&obs);
    let statistics = regime_statistics(returns, &history);

    log::debug!(
        "Regime: {} states (BIC {:.2}) fitted in {} iterations, current = {} (p = {:.3})",
        n,
        selected.bic,
        selected.iterations,
        states[current_regime].label,
        posterior[current_regime]
    );

    Ok(RegimeResult {
        current_regime,
        regime_probabilities: posterior,
        regime_descriptions,
        n_states: n,
        states,
        transition_matrix: model.transition,
        log_likelihood: selected.log_likelihood,
        bic: selected.bic,
        bic_by_states: selected.bic_by_states,
        iterations: selected.iterations,
        history,
        statistics,
    })
}

/// `k ln(T) - 2 ln L` for an HMM with `n_states` states fitted on `observations` points.
pub fn bic(log_likelihood: f64, n_states: usize, observations: usize) -> f64 {
    GaussianHmm::parameter_count(n_states) as f64 * (observations.max(1) as f64).ln() - 2.0 * log_likelihood
}

struct Selected {
    model: GaussianHmm,
    log_likelihood: f64,
    bic: f64,
    bic_by_states: BTreeMap<usize, f64>,
    iterations: usize,
}

/// Fit every candidate state count and keep the lowest BIC; ties go to fewer states.
/// A candidate that fails to fit is skipped unless every candidate fails.
fn select_by_bic(obs: &[f64], config: &RegimeConfig, deadline: &Deadline) -> Result<Selected, AnalysisError> {
    let max_states = config.n_states;
    let min_states = config.min_states.clamp(1, max_states.max(1));

    let mut best: Option<Selected> = None;
    let mut bic_by_states = BTreeMap::new();
    let mut last_error = None;

    for k in min_states..=max_states {
        match fit_hmm(obs, k, config, deadline) {
            Ok((model, log_likelihood, iterations)) => {
                let score = bic(log_likelihood, k, obs.len());
                bic_by_states.insert(k, score);
                if best.as_ref().is_none_or(|b| score < b.bic) {
                    best = Some(Selected {
                        model,
                        log_likelihood,
                        bic: score,
                        bic_by_states: BTreeMap::new(),
                        iterations,
                    });
                }
            }
            Err(e @ AnalysisError::Timeout { .. }) => return Err(e),
            Err(e) => {
                log::debug!("HMM with {} states rejected: {}", k, e);
                last_error = Some(e);
            }
        }
    }

    match best {
        Some(selected) => Ok(Selected {
            bic_by_states,
            ..selected
        }),
        None => Err(last_error
            .unwrap_or_else(|| AnalysisError::ModelFitFailure("n_states must be positive".into()))),
    }
}

/// Per-state realised statistics along a decoded path.
pub fn regime_statistics(returns: &[f64], history: &[usize]) -> BTreeMap<usize, RegimeStatistics> {
    let mut grouped: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
    for (&state, &r) in history.iter().zip(returns) {
        grouped.entry(state).or_default().push(r);
    }
    let total = history.len().min(returns.len()).max(1) as f64;

    grouped
        .into_iter()
        .map(|(state, values)| {
            let (mean, _) = mean_and_stddev(&values);
            let volatility = sample_variance(&values).sqrt();
            let stats = RegimeStatistics {
                observations: values.len(),
                frequency: values.len() as f64 / total,
                mean_return: mean,
                volatility,
                sharpe_ratio: if volatility > 0.0 { mean / volatility } else { 0.0 },
                min_return: values.iter().copied().fold(f64::INFINITY, f64::min),
                max_return: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };
            (state, stats)
        })
        .collect()
}

/// Tier from the variance rank of a canonically ordered state.
pub fn volatility_tier(rank: usize, n_states: usize) -> VolatilityTier {
    if n_states <= 1 {
        VolatilityTier::Moderate
    } else if rank == 0 {
        VolatilityTier::Low
    } else if rank + 1 == n_states {
        VolatilityTier::High
    } else {
        VolatilityTier::Moderate
    }
}

pub fn direction(mean: f64, dead_band: f64) -> RegimeDirection {
    if mean > dead_band {
        RegimeDirection::Bull
    } else if mean < -dead_band {
        RegimeDirection::Bear
    } else {
        RegimeDirection::Sideways
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ANALYSIS;
    use crate::data::synthetic;

    fn two_state_config() -> RegimeConfig {
        RegimeConfig {
            n_states: 2,
            ..ANALYSIS.regime.clone()
        }
    }

    #[test]
    fn separates_calm_and_turbulent_blocks() {
        let mut returns = synthetic::white_noise(150, 0.005, 1);
        returns.extend(synthetic::white_noise(150, 0.03, 2));
        let result = detect_regimes(&returns, &two_state_config(), &Deadline::unbounded()).unwrap();

        assert_eq!(result.n_states, 2);
        assert!(result.states[0].variance < result.states[1].variance);
        assert_eq!(result.current_regime, 1);
        assert!(result.current_posterior() > 0.9);
        assert_eq!(result.states[1].tier, VolatilityTier::High);
        assert!(result.regime_descriptions[&1].starts_with("High-Volatility"));
    }

    #[test]
    fn posterior_sums_to_one_and_labels_cover_every_state() {
        let returns = synthetic::white_noise(400, 0.01, 5);
        let result = detect_regimes(&returns, &ANALYSIS.regime, &Deadline::unbounded()).unwrap();

        let total: f64 = result.regime_probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert_eq!(result.regime_descriptions.len(), result.n_states);
        assert_eq!(argmax(&result.regime_probabilities), Some(result.current_regime));
        for row in &result.transition_matrix {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }

        assert_eq!(result.history.len(), returns.len());
        assert!(result.history.iter().all(|&s| s < result.n_states));
        let frequency: f64 = result.statistics.values().map(|s| s.frequency).sum();
        assert!((frequency - 1.0).abs() < 1e-9);
    }

    #[test]
    fn default_config_keeps_the_turbulent_block_as_one_regime() {
        let candles = synthetic::regime_switch(&[(60, 0.005), (60, 0.025)], 100.0, 11);
        let closes: Vec<f64> = candles.iter().map(|c| c.close_price).collect();
        let returns = crate::utils::log_returns(&closes);
        let result = detect_regimes(&returns, &ANALYSIS.regime, &Deadline::unbounded()).unwrap();

        let best = result.bic_by_states.values().copied().fold(f64::INFINITY, f64::min);
        assert_eq!(result.bic, best);
        assert_eq!(result.bic_by_states[&result.n_states], result.bic);

        let current = result.current_state().unwrap();
        let max_variance = result.states.iter().map(|s| s.variance).fold(f64::MIN, f64::max);
        assert_eq!(current.variance, max_variance);
        assert_eq!(current.tier, VolatilityTier::High);
        assert!(result.current_posterior() > 0.6, "posterior {}", result.current_posterior());
        assert_eq!(*result.history.last().unwrap(), result.current_regime);
    }

    #[test]
    fn bic_charges_for_every_free_parameter() {
        assert_eq!(GaussianHmm::parameter_count(1), 2);
        assert_eq!(GaussianHmm::parameter_count(2), 7);
        assert_eq!(GaussianHmm::parameter_count(3), 14);
        assert!((bic(-50.0, 2, 100) - (7.0 * 100f64.ln() + 100.0)).abs() < 1e-12);
    }

    #[test]
    fn viterbi_follows_separated_emissions() {
        let model = GaussianHmm {
            initial: vec![0.5, 0.5],
            transition: vec![vec![0.9, 0.1], vec![0.1, 0.9]],
            means: vec![0.0, 10.0],
            variances: vec![1.0, 1.0],
        };
        let path = model.viterbi(&[0.1, -0.2, 0.0, 10.2, 9.8, 10.1]);
        assert_eq!(path, vec![0, 0, 0, 1, 1, 1]);
        assert!(model.viterbi(&[]).is_empty());
    }

    #[test]
    fn statistics_group_returns_by_decoded_state() {
        let stats = regime_statistics(&[0.01, -0.01, 0.03, 0.05], &[0, 0, 1, 1]);
        assert_eq!(stats.len(), 2);

        let calm = &stats[&0];
        assert_eq!(calm.observations, 2);
        assert!((calm.frequency - 0.5).abs() < 1e-12);
        assert!(calm.mean_return.abs() < 1e-15);
        assert!((calm.volatility - 0.0002f64.sqrt()).abs() < 1e-12);

        let up = &stats[&1];
        assert!((up.mean_return - 0.04).abs() < 1e-12);
        assert_eq!(up.min_return, 0.03);
        assert_eq!(up.max_return, 0.05);
        assert!((up.sharpe_ratio - 0.04 / 0.0002f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn state_order_does_not_depend_on_fit_indices() {
        let model = GaussianHmm {
            initial: vec![0.5, 0.5],
            transition: vec![vec![0.8, 0.2], vec![0.3, 0.7]],
            means: vec![0.1, -0.2],
            variances: vec![4.0, 1.0],
        };
        let canonical = model.canonical();
        assert_eq!(canonical.variances, vec![1.0, 4.0]);
        assert_eq!(canonical.means, vec![-0.2, 0.1]);
        assert_eq!(canonical.transition, vec![vec![0.7, 0.3], vec![0.2, 0.8]]);
    }

    #[test]
    fn stationary_distribution_of_a_two_state_chain() {
        let model = GaussianHmm {
            initial: vec![0.5, 0.5],
            transition: vec![vec![0.9, 0.1], vec![0.2, 0.8]],
            means: vec![0.0, 0.0],
            variances: vec![1.0, 2.0],
        };
        let pi = model.stationary_distribution();
        assert!((pi[0] - 2.0 / 3.0).abs() < 1e-9);
        assert!((pi[1] - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn flat_returns_fail_to_fit() {
        let returns = vec![0.003; 200];
        assert!(matches!(
            detect_regimes(&returns, &ANALYSIS.regime, &Deadline::unbounded()),
            Err(AnalysisError::ModelFitFailure(_))
        ));
        assert!(matches!(
            detect_regimes(&returns[..10], &ANALYSIS.regime, &Deadline::unbounded()),
            Err(AnalysisError::InsufficientData { .. })
        ));
    }

    #[test]
    fn labels_follow_mean_and_rank() {
        assert_eq!(direction(0.2, 0.05), RegimeDirection::Bull);
        assert_eq!(direction(-0.2, 0.05), RegimeDirection::Bear);
        assert_eq!(direction(0.01, 0.05), RegimeDirection::Sideways);
        assert_eq!(volatility_tier(0, 3), VolatilityTier::Low);
        assert_eq!(volatility_tier(1, 3), VolatilityTier::Moderate);
        assert_eq!(volatility_tier(2, 3), VolatilityTier::High);
    }
}
