//! GARCH(1,1) and GJR-GARCH(1,1) fitted by Gaussian maximum likelihood.
//!
//! The optimiser works on unconstrained coordinates: `omega = exp(t0)`, persistence
//! `alpha + gamma/2 + beta = MAX_PERSISTENCE * sigmoid(t1)`, and the split of that
//! persistence between the terms through a softmax. Every candidate therefore satisfies
//! `omega > 0`, `alpha, beta, gamma >= 0` and `alpha + gamma/2 + beta < 1`.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::analysis::optimizer::{NelderMeadOptions, nelder_mead};
use crate::config::VolatilityModel;
use crate::config::constants::volatility::MAX_PERSISTENCE;
use crate::error::AnalysisError;
use crate::utils::{Deadline, mean_and_stddev, sample_variance, sigmoid};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GarchParams {
    pub omega: f64,
    pub alpha: f64,
    /// Leverage term, zero for plain GARCH.
    pub gamma: f64,
    pub beta: f64,
}

impl GarchParams {
    /// `alpha + gamma / 2 + beta`. Symmetric shocks hit the negative branch half the time.
    pub fn persistence(&self) -> f64 {
        self.alpha + 0.5 * self.gamma + self.beta
    }

    /// Bars for a variance shock to decay by half.
    pub fn half_life(&self) -> Option<f64> {
        let p = self.persistence();
        if p <= 0.0 || p >= 1.0 {
            None
        } else {
            Some(-(2.0_f64.ln()) / p.ln())
        }
    }

    pub fn is_valid(&self) -> bool {
        let all_finite = [self.omega, self.alpha, self.gamma, self.beta]
            .iter()
            .all(|v| v.is_finite());
        all_finite
            && self.omega > 0.0
            && self.alpha >= 0.0
            && self.gamma >= 0.0
            && self.beta >= 0.0
            && self.persistence() < 1.0
    }

    fn from_unconstrained(theta: &[f64], model: VolatilityModel) -> Self {
        let omega = theta[0].exp();
        let persistence = MAX_PERSISTENCE * sigmoid(theta[1]);
        match model {
            VolatilityModel::Garch => {
                let share = sigmoid(theta[2]);
                Self {
                    omega,
                    alpha: persistence * share,
                    gamma: 0.0,
                    beta: persistence * (1.0 - share),
                }
            }
            VolatilityModel::GjrGarch => {
                let (e1, e2) = (theta[2].exp(), theta[3].exp());
                let total = e1 + e2 + 1.0;
                Self {
                    omega,
                    alpha: persistence * e1 / total,
                    gamma: 2.0 * persistence * e2 / total,
                    beta: persistence / total,
                }
            }
        }
    }

    fn to_unconstrained(&self, model: VolatilityModel) -> Vec<f64> {
        let logit = |p: f64| (p / (1.0 - p)).ln();
        let persistence = self.persistence();
        let mut theta = vec![self.omega.ln(), logit(persistence / MAX_PERSISTENCE)];
        match model {
            VolatilityModel::Garch => theta.push(logit(self.alpha / persistence)),
            VolatilityModel::GjrGarch => {
                theta.push((self.alpha / self.beta).ln());
                theta.push((0.5 * self.gamma / self.beta).ln());
            }
        }
        theta
    }

    fn starting_point(model: VolatilityModel, variance: f64) -> Self {
        let (alpha, gamma, beta) = match model {
            VolatilityModel::Garch => (0.05, 0.0, 0.90),
            VolatilityModel::GjrGarch => (0.03, 0.06, 0.89),
        };
        let params = Self {
            omega: 0.0,
            alpha,
            gamma,
            beta,
        };
        Self {
            omega: variance * (1.0 - params.persistence()),
            ..params
        }
    }

    pub fn to_map(&self, model: VolatilityModel, mu: f64) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("mu".to_string(), mu);
        map.insert("omega".to_string(), self.omega);
        map.insert("alpha".to_string(), self.alpha);
        map.insert("beta".to_string(), self.beta);
        if model == VolatilityModel::GjrGarch {
            map.insert("gamma".to_string(), self.gamma);
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GarchFit {
    pub model: VolatilityModel,
    pub params: GarchParams,
    /// Constant conditional mean.
    pub mu: f64,
    pub log_likelihood: f64,
    /// In-sample conditional variances, one per observation.
    pub conditional_variance: Vec<f64>,
    pub residuals: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl GarchFit {
    fn parameter_count(&self) -> f64 {
        match self.model {
            VolatilityModel::Garch => 4.0,
            VolatilityModel::GjrGarch => 5.0,
        }
    }

    pub fn aic(&self) -> f64 {
        2.0 * self.parameter_count() - 2.0 * self.log_likelihood
    }

    pub fn bic(&self) -> f64 {
        self.parameter_count() * (self.residuals.len() as f64).ln() - 2.0 * self.log_likelihood
    }

    /// Iterated variance recursion. Step 1 uses the last shock; later steps use its expectation.
    pub fn forecast_variance(&self, horizon: usize) -> Vec<f64> {
        let p = &self.params;
        let (Some(&last_var), Some(&last_eps)) =
            (self.conditional_variance.last(), self.residuals.last())
        else {
            return vec![0.0; horizon];
        };

        let mut forecasts = Vec::with_capacity(horizon);
        let mut next = p.omega + (p.alpha + leverage(p.gamma, last_eps)) * last_eps * last_eps + p.beta * last_var;
        for _ in 0..horizon {
            forecasts.push(next.max(0.0));
            next = p.omega + p.persistence() * next;
        }
        forecasts
    }
}

#[inline]
fn leverage(gamma: f64, eps: f64) -> f64 {
    if eps < 0.0 { gamma } else { 0.0 }
}

/// `sigma2_t = omega + (alpha + gamma * 1[e_{t-1} < 0]) * e_{t-1}^2 + beta * sigma2_{t-1}`,
/// started from the sample variance.
fn conditional_variance(residuals: &[f64], params: &GarchParams, initial: f64) -> Vec<f64> {
    let mut sigma2 = Vec::with_capacity(residuals.len());
    let mut prev_var = initial;
    let mut prev_eps = 0.0;
    for (t, eps) in residuals.iter().enumerate() {
        let var = if t == 0 {
            initial
        } else {
            params.omega
                + (params.alpha + leverage(params.gamma, prev_eps)) * prev_eps * prev_eps
                + params.beta * prev_var
        };
        sigma2.push(var);
        prev_var = var;
        prev_eps = *eps;
    }
    sigma2
}

fn log_likelihood(residuals: &[f64], sigma2: &[f64]) -> f64 {
    -0.5 * residuals
        .iter()
        .zip(sigma2)
        .map(|(e, s2)| (2.0 * PI).ln() + s2.ln() + e * e / s2)
        .sum::<f64>()
}

/// Fit `model` to (already scaled) returns.
pub fn fit_garch(
    returns: &[f64],
    model: VolatilityModel,
    max_iter: usize,
    deadline: &Deadline,
) -> Result<GarchFit, AnalysisError> {
    let (mu, std) = mean_and_stddev(returns);
    if std <= 0.0 || !std.is_finite() {
        return Err(AnalysisError::NumericalDegeneracy("returns have zero variance".into()));
    }
    let residuals: Vec<f64> = returns.iter().map(|r| r - mu).collect();
    let initial = sample_variance(&residuals);

    let start = GarchParams::starting_point(model, initial).to_unconstrained(model);
    let objective = |theta: &[f64]| {
        let params = GarchParams::from_unconstrained(theta, model);
        let sigma2 = conditional_variance(&residuals, &params, initial);
        -log_likelihood(&residuals, &sigma2)
    };

    let options = NelderMeadOptions {
        max_iter,
        ..Default::default()
    };
    let minimum = nelder_mead(objective, &start, options, deadline)?;

    if !minimum.value.is_finite() {
        return Err(AnalysisError::ModelDivergence(
            "likelihood is not finite at the optimum".into(),
        ));
    }
    let params = GarchParams::from_unconstrained(&minimum.point, model);
    if !params.is_valid() {
        return Err(AnalysisError::ModelDivergence(format!(
            "fitted parameters violate constraints: {:?}",
            params
        )));
    }
    let sigma2 = conditional_variance(&residuals, &params, initial);
    if sigma2.iter().any(|v| !v.is_finite() || *v <= 0.0) {
        return Err(AnalysisError::ModelDivergence(
            "conditional variance left the positive reals".into(),
        ));
    }
    if !minimum.converged {
        log::debug!(
            "{} optimiser stopped after {} iterations without meeting tolerance",
            model,
            minimum.iterations
        );
    }

    Ok(GarchFit {
        model,
        params,
        mu,
        log_likelihood: -minimum.value,
        conditional_variance: sigma2,
        residuals,
        iterations: minimum.iterations,
        converged: minimum.converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    /// Simulate a GARCH(1,1) path with known parameters.
    fn simulate(params: GarchParams, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut var = params.omega / (1.0 - params.persistence());
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let eps = var.sqrt() * normal.sample(&mut rng);
            out.push(eps);
            var = params.omega + (params.alpha + leverage(params.gamma, eps)) * eps * eps + params.beta * var;
        }
        out
    }

    #[test]
    fn reparameterisation_round_trips() {
        for model in [VolatilityModel::Garch, VolatilityModel::GjrGarch] {
            let p = GarchParams::starting_point(model, 2.0);
            let back = GarchParams::from_unconstrained(&p.to_unconstrained(model), model);
            assert!((back.omega - p.omega).abs() < 1e-12);
            assert!((back.alpha - p.alpha).abs() < 1e-12);
            assert!((back.gamma - p.gamma).abs() < 1e-12);
            assert!((back.beta - p.beta).abs() < 1e-12);
        }
    }

    #[test]
    fn any_unconstrained_point_is_a_valid_model() {
        for theta in [[-30.0, 40.0, -40.0, 40.0], [5.0, -5.0, 3.0, -3.0], [0.0; 4]] {
            for model in [VolatilityModel::Garch, VolatilityModel::GjrGarch] {
                assert!(GarchParams::from_unconstrained(&theta, model).is_valid());
            }
        }
    }

    #[test]
    fn recovers_persistence_of_a_simulated_path() {
        let truth = GarchParams {
            omega: 0.05,
            alpha: 0.08,
            gamma: 0.0,
            beta: 0.88,
        };
        let returns = simulate(truth, 2000, 42);
        let fit = fit_garch(&returns, VolatilityModel::Garch, 2000, &Deadline::unbounded()).unwrap();
        assert!(fit.params.is_valid());
        assert!((fit.params.persistence() - truth.persistence()).abs() < 0.06);
        assert!(fit.aic() > 0.0 && fit.bic() > fit.aic());
    }

    #[test]
    fn forecast_has_requested_length_and_reverts_to_long_run_variance() {
        let truth = GarchParams {
            omega: 0.1,
            alpha: 0.1,
            gamma: 0.1,
            beta: 0.8,
        };
        let returns = simulate(truth, 800, 7);
        let fit = fit_garch(&returns, VolatilityModel::GjrGarch, 2000, &Deadline::unbounded()).unwrap();
        let forecast = fit.forecast_variance(50);
        assert_eq!(forecast.len(), 50);
        assert!(forecast.iter().all(|v| *v >= 0.0));
        let long_run = fit.params.omega / (1.0 - fit.params.persistence());
        let gaps: Vec<f64> = forecast.iter().map(|v| (v - long_run).abs()).collect();
        assert!(gaps.windows(2).all(|g| g[1] <= g[0] + 1e-12));
    }

    #[test]
    fn zero_variance_is_degenerate() {
        assert!(matches!(
            fit_garch(&[0.3; 150], VolatilityModel::Garch, 100, &Deadline::unbounded()),
            Err(AnalysisError::NumericalDegeneracy(_))
        ));
    }

    #[test]
    fn half_life_matches_persistence() {
        let p = GarchParams {
            omega: 0.1,
            alpha: 0.05,
            gamma: 0.0,
            beta: 0.9,
        };
        let hl = p.half_life().unwrap();
        assert!((0.95f64.powf(hl) - 0.5).abs() < 1e-9);
    }
}
