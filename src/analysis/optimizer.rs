//! Derivative-free Nelder-Mead minimiser used by the likelihood fits.

use crate::error::AnalysisError;
use crate::utils::Deadline;

#[derive(Debug, Clone, Copy)]
pub struct NelderMeadOptions {
    pub max_iter: usize,
    /// Stop once the simplex values agree to this relative tolerance.
    pub f_tol: f64,
    /// Initial simplex offset along each axis.
    pub initial_step: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            max_iter: 2000,
            f_tol: 1e-10,
            initial_step: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Minimise `objective` from `start`. Non-finite objective values count as `+inf`.
/// The deadline is polled once per iteration.
pub fn nelder_mead<F>(
    mut objective: F,
    start: &[f64],
    options: NelderMeadOptions,
    deadline: &Deadline,
) -> Result<Minimum, AnalysisError>
where
    F: FnMut(&[f64]) -> f64,
{
    let dim = start.len();
    let mut eval = |x: &[f64]| {
        let v = objective(x);
        if v.is_finite() { v } else { f64::INFINITY }
    };

    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(dim + 1);
    simplex.push((start.to_vec(), eval(start)));
    for i in 0..dim {
        let mut vertex = start.to_vec();
        vertex[i] += options.initial_step;
        let value = eval(&vertex);
        simplex.push((vertex, value));
    }

    let mut iterations = 0;
    let mut converged = false;
    while iterations < options.max_iter {
        deadline.check()?;
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

        let best = simplex[0].1;
        let worst = simplex[dim].1;
        if best.is_finite() && (worst - best).abs() <= options.f_tol * (1.0 + best.abs()) {
            converged = true;
            break;
        }
        iterations += 1;

        let centroid: Vec<f64> = (0..dim)
            .map(|j| simplex[..dim].iter().map(|(v, _)| v[j]).sum::<f64>() / dim as f64)
            .collect();
        let towards = |coef: f64, from: &[f64]| -> Vec<f64> {
            centroid
                .iter()
                .zip(from)
                .map(|(c, w)| c + coef * (c - w))
                .collect()
        };

        let worst_point = simplex[dim].0.clone();
        let reflected = towards(REFLECT, &worst_point);
        let f_reflected = eval(&reflected);

        if f_reflected < simplex[0].1 {
            let expanded = towards(EXPAND, &worst_point);
            let f_expanded = eval(&expanded);
            simplex[dim] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
        } else if f_reflected < simplex[dim - 1].1 {
            simplex[dim] = (reflected, f_reflected);
        } else {
            let contracted = towards(-CONTRACT, &worst_point);
            let f_contracted = eval(&contracted);
            if f_contracted < simplex[dim].1 {
                simplex[dim] = (contracted, f_contracted);
            } else {
                let anchor = simplex[0].0.clone();
                for (vertex, value) in simplex.iter_mut().skip(1) {
                    for (x, a) in vertex.iter_mut().zip(&anchor) {
                        *x = a + SHRINK * (*x - a);
                    }
                    *value = eval(vertex);
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (point, value) = simplex.swap_remove(0);
    Ok(Minimum {
        point,
        value,
        iterations,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimises_a_shifted_quadratic() {
        let min = nelder_mead(
            |x| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2),
            &[0.0, 0.0],
            NelderMeadOptions::default(),
            &Deadline::unbounded(),
        )
        .unwrap();
        assert!(min.converged);
        assert!((min.point[0] - 3.0).abs() < 1e-3);
        assert!((min.point[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn handles_the_rosenbrock_valley() {
        let options = NelderMeadOptions {
            max_iter: 5000,
            ..Default::default()
        };
        let min = nelder_mead(
            |x| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2),
            &[-1.2, 1.0],
            options,
            &Deadline::unbounded(),
        )
        .unwrap();
        assert!(min.value < 1e-6, "value = {}", min.value);
    }

    #[test]
    fn non_finite_regions_are_avoided() {
        let min = nelder_mead(
            |x| if x[0] < 0.0 { f64::NAN } else { (x[0] - 1.0).powi(2) },
            &[2.0],
            NelderMeadOptions::default(),
            &Deadline::unbounded(),
        )
        .unwrap();
        assert!((min.point[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn expired_deadline_aborts() {
        let result = nelder_mead(
            |x| x[0] * x[0],
            &[1.0],
            NelderMeadOptions::default(),
            &Deadline::after(std::time::Duration::ZERO),
        );
        assert!(matches!(result, Err(AnalysisError::Timeout { .. })));
    }
}
