//! Multi-level Haar wavelet denoising with soft thresholding (Donoho-Johnstone universal threshold).

use std::f64::consts::FRAC_1_SQRT_2;

use crate::utils::median;

struct Level {
    detail: Vec<f64>,
    /// Length of the approximation this level was computed from (before padding).
    input_len: usize,
}

/// Denoise `data` with `levels` Haar decomposition levels.
///
/// The noise scale comes from the finest detail level (`sigma = MAD / 0.6745`); every
/// detail coefficient is soft-thresholded by `sigma * sqrt(2 ln n)` before reconstruction.
/// Output length always equals input length.
pub fn denoise(data: &[f64], levels: usize) -> Vec<f64> {
    let n = data.len();
    if n < 4 || levels == 0 {
        return data.to_vec();
    }

    let mut approx = data.to_vec();
    let mut decomposition: Vec<Level> = Vec::new();
    for _ in 0..levels {
        if approx.len() < 2 {
            break;
        }
        let input_len = approx.len();
        if approx.len() % 2 == 1 {
            // Symmetric extension by one sample.
            approx.push(approx[approx.len() - 1]);
        }
        let (next, detail): (Vec<f64>, Vec<f64>) = approx
            .chunks_exact(2)
            .map(|pair| {
                (
                    (pair[0] + pair[1]) * FRAC_1_SQRT_2,
                    (pair[0] - pair[1]) * FRAC_1_SQRT_2,
                )
            })
            .unzip();
        decomposition.push(Level { detail, input_len });
        approx = next;
    }

    let Some(finest) = decomposition.first() else {
        return data.to_vec();
    };
    let abs_detail: Vec<f64> = finest.detail.iter().map(|d| d.abs()).collect();
    let sigma = median(&abs_detail) / 0.6745;
    let threshold = sigma * (2.0 * (n as f64).ln()).sqrt();

    if threshold > 0.0 && threshold.is_finite() {
        for level in &mut decomposition {
            for d in &mut level.detail {
                *d = soft_threshold(*d, threshold);
            }
        }
    }

    for level in decomposition.iter().rev() {
        let mut rebuilt = Vec::with_capacity(approx.len() * 2);
        for (a, d) in approx.iter().zip(&level.detail) {
            rebuilt.push((a + d) * FRAC_1_SQRT_2);
            rebuilt.push((a - d) * FRAC_1_SQRT_2);
        }
        rebuilt.truncate(level.input_len);
        approx = rebuilt;
    }
    approx
}

#[inline]
fn soft_threshold(value: f64, threshold: f64) -> f64 {
    value.signum() * (value.abs() - threshold).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic;

    #[test]
    fn preserves_length_including_odd_lengths() {
        for n in [4, 7, 33, 101] {
            let data = synthetic::white_noise(n, 1.0, n as u64);
            assert_eq!(denoise(&data, 3).len(), n);
        }
    }

    #[test]
    fn smooth_signal_survives_and_noise_shrinks() {
        let clean: Vec<f64> = (0..256).map(|i| (i as f64 / 20.0).sin()).collect();
        let noise = synthetic::white_noise(256, 0.3, 9);
        let noisy: Vec<f64> = clean.iter().zip(&noise).map(|(c, e)| c + e).collect();

        let denoised = denoise(&noisy, 3);
        let err = |xs: &[f64]| -> f64 {
            xs.iter().zip(&clean).map(|(x, c)| (x - c).powi(2)).sum::<f64>()
        };
        assert!(err(&denoised) < err(&noisy));
    }

    #[test]
    fn constant_input_is_returned_exactly() {
        let flat = vec![2.5; 16];
        let out = denoise(&flat, 3);
        assert!(out.iter().all(|x| (x - 2.5).abs() < 1e-12));
    }

    #[test]
    fn soft_threshold_shrinks_toward_zero() {
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-0.5, 1.0), 0.0);
        assert_eq!(soft_threshold(-2.0, 0.5), -1.5);
    }
}
