//! Long-memory and periodicity of a return series: rescaled-range Hurst exponent and the
//! dominant FFT frequency, optionally on a wavelet-denoised copy.

use itertools::Itertools;
use rustfft::{FftPlanner, num_complex::Complex};

use crate::analysis::wavelet;
use crate::config::{HurstInterpretation, SeriesInput, SpectralConfig};
use crate::error::AnalysisError;
use crate::models::{HurstRegime, SignalProcessingResult};
use crate::utils::{argmax, is_effectively_constant, linear_fit, mean_and_stddev};

#[derive(Debug, Clone, PartialEq)]
pub struct HurstEstimate {
    /// Clamped into [0, 1].
    pub exponent: f64,
    /// Slope of the log-log fit before clamping.
    pub raw_slope: f64,
    pub clamped: bool,
    pub windows: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpectralOutput {
    pub result: SignalProcessingResult,
    /// The denoised series when denoising was enabled.
    pub denoised: Option<Vec<f64>>,
}

/// Smallest series the Hurst fit accepts: two full copies of the largest window, which
/// itself spans `min_window_span` times the smallest.
pub fn hurst_min_length(config: &SpectralConfig) -> usize {
    2 * config.min_window * config.min_window_span
}

pub fn analyze_spectrum(
    series: &[f64],
    fractional_order: Option<f64>,
    config: &SpectralConfig,
    input: SeriesInput,
) -> Result<SpectralOutput, AnalysisError> {
    let required = hurst_min_length(config);
    if series.len() < required {
        return Err(AnalysisError::insufficient(required, series.len()));
    }

    let denoised = config
        .denoise
        .then(|| wavelet::denoise(series, config.wavelet_levels));
    let working = denoised.as_deref().unwrap_or(series);

    let hurst = hurst_exponent(working, config)?;
    let (hurst_regime, label) = interpret(hurst.exponent, &config.interpretation);
    let spectrum = dominant_frequency(working);

    log::debug!(
        "Spectral: H = {:.3} ({}), dominant period {:?} bars",
        hurst.exponent,
        label,
        spectrum.map(|(_, p)| p)
    );

    Ok(SpectralOutput {
        result: SignalProcessingResult {
            fractional_diff_order: fractional_order,
            hurst_exponent: hurst.exponent,
            hurst_clamped: hurst.clamped,
            hurst_regime,
            hurst_interpretation: label.to_string(),
            dominant_frequency: spectrum.map(|(f, _)| f),
            dominant_period: spectrum.map(|(_, p)| p),
            denoised: config.denoise,
            input,
        },
        denoised,
    })
}

/// Classic rescaled-range Hurst exponent over log-spaced, non-overlapping windows.
///
/// A series with no variation around a non-zero mean is a pure drift and gets `H = 1`.
pub fn hurst_exponent(series: &[f64], config: &SpectralConfig) -> Result<HurstEstimate, AnalysisError> {
    let n = series.len();
    let required = hurst_min_length(config);
    if n < required {
        return Err(AnalysisError::insufficient(required, n));
    }

    if is_effectively_constant(series) {
        let (mean, _) = mean_and_stddev(series);
        if mean.abs() > 0.0 {
            return Ok(HurstEstimate {
                exponent: 1.0,
                raw_slope: 1.0,
                clamped: false,
                windows: Vec::new(),
            });
        }
        return Err(AnalysisError::NumericalDegeneracy(
            "series is identically zero, rescaled range undefined".into(),
        ));
    }

    let windows = log_spaced_windows(config.min_window, n / 2, config.window_count);
    let mut log_w = Vec::with_capacity(windows.len());
    let mut log_rs = Vec::with_capacity(windows.len());

    for &w in &windows {
        if let Some(rs) = mean_rescaled_range(series, w) {
            log_w.push((w as f64).ln());
            log_rs.push(rs.ln());
        }
    }

    if log_w.len() < 3 {
        return Err(AnalysisError::NumericalDegeneracy(format!(
            "only {} usable R/S windows",
            log_w.len()
        )));
    }

    let (slope, _) = linear_fit(&log_w, &log_rs).ok_or_else(|| {
        AnalysisError::NumericalDegeneracy("degenerate log-log regression".into())
    })?;
    if !slope.is_finite() {
        return Err(AnalysisError::NumericalDegeneracy("non-finite Hurst slope".into()));
    }

    let exponent = slope.clamp(0.0, 1.0);
    let clamped = exponent != slope;
    if clamped {
        log::warn!("Hurst slope {:.3} outside [0, 1], clamped to {:.1}", slope, exponent);
    }

    Ok(HurstEstimate {
        exponent,
        raw_slope: slope,
        clamped,
        windows,
    })
}

fn log_spaced_windows(min: usize, max: usize, count: usize) -> Vec<usize> {
    if max <= min || count < 2 {
        return vec![min];
    }
    let (lo, hi) = ((min as f64).ln(), (max as f64).ln());
    (0..count)
        .map(|i| (lo + (hi - lo) * i as f64 / (count - 1) as f64).exp().round() as usize)
        .dedup()
        .collect()
}

/// Average R/S over the non-overlapping chunks of width `w`. Flat chunks are skipped.
fn mean_rescaled_range(series: &[f64], w: usize) -> Option<f64> {
    if w < 2 {
        return None;
    }
    let (sum, count) = series
        .chunks_exact(w)
        .filter_map(|chunk| {
            let (mean, std) = mean_and_stddev(chunk);
            if std < 1e-14 {
                return None;
            }
            let mut cumulative = 0.0;
            let (mut lo, mut hi) = (0.0f64, 0.0f64);
            for x in chunk {
                cumulative += x - mean;
                lo = lo.min(cumulative);
                hi = hi.max(cumulative);
            }
            Some((hi - lo) / std)
        })
        .fold((0.0, 0usize), |(s, c), rs| (s + rs, c + 1));
    (count > 0 && sum > 0.0).then(|| sum / count as f64)
}

pub fn interpret(hurst: f64, mapping: &HurstInterpretation) -> (HurstRegime, &str) {
    if hurst < mapping.mean_reverting_below {
        (HurstRegime::MeanReverting, &*mapping.mean_reverting)
    } else if hurst > mapping.trending_above {
        (HurstRegime::Trending, &*mapping.trending)
    } else {
        (HurstRegime::RandomWalk, &*mapping.random_walk)
    }
}

/// Frequency (cycles per bar) and period (bars) of the strongest non-DC FFT bin of the
/// mean-centred series. `None` when the centred series carries no power.
pub fn dominant_frequency(series: &[f64]) -> Option<(f64, f64)> {
    let n = series.len();
    if n < 4 || is_effectively_constant(series) {
        return None;
    }
    let (mean, _) = mean_and_stddev(series);
    let mut buffer: Vec<Complex<f64>> = series
        .iter()
        .map(|x| Complex::new(x - mean, 0.0))
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(n).process(&mut buffer);

    // Positive frequencies only, skipping the DC bin at index 0.
    let power: Vec<f64> = buffer[1..=n / 2].iter().map(|c| c.norm_sqr()).collect();
    let peak = argmax(&power)?;
    if power[peak] <= 0.0 {
        return None;
    }
    let k = (peak + 1) as f64;
    Some((k / n as f64, n as f64 / k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ANALYSIS;
    use crate::data::synthetic;

    #[test]
    fn pure_drift_is_fully_persistent() {
        let returns = vec![0.003; 299];
        let h = hurst_exponent(&returns, &ANALYSIS.spectral).unwrap();
        assert_eq!(h.exponent, 1.0);
        assert!(!h.clamped);
    }

    #[test]
    fn anti_persistent_returns_score_below_one_half() {
        // Alternating shocks: every move is undone by the next one.
        let noise = synthetic::white_noise(1000, 1.0, 17);
        let returns: Vec<f64> = noise.windows(2).map(|w| w[1] - w[0]).collect();
        let h = hurst_exponent(&returns, &ANALYSIS.spectral).unwrap();
        assert!(h.exponent < 0.45, "H = {}", h.exponent);
    }

    #[test]
    fn too_short_input_is_rejected() {
        let returns = synthetic::white_noise(100, 1.0, 1);
        assert_eq!(
            hurst_exponent(&returns, &ANALYSIS.spectral),
            Err(AnalysisError::InsufficientData { required: 160, actual: 100 })
        );
    }

    #[test]
    fn zero_min_window_is_degenerate_rather_than_a_panic() {
        let mut config = ANALYSIS.spectral.clone();
        config.min_window = 0;
        let returns = synthetic::white_noise(300, 0.01, 9);
        assert!(matches!(
            hurst_exponent(&returns, &config),
            Err(AnalysisError::NumericalDegeneracy(_))
        ));
    }

    #[test]
    fn windows_span_an_order_of_magnitude() {
        let windows = log_spaced_windows(8, 150, 10);
        assert_eq!(windows[0], 8);
        assert_eq!(*windows.last().unwrap(), 150);
        assert!(windows.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn finds_the_injected_cycle() {
        let n = 256;
        let series: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * i as f64 / 16.0).sin())
            .collect();
        let (freq, period) = dominant_frequency(&series).unwrap();
        assert!((period - 16.0).abs() < 1e-9);
        assert!((freq - 1.0 / 16.0).abs() < 1e-12);
        assert!(dominant_frequency(&[1.0; 64]).is_none());
    }

    #[test]
    fn interpretation_uses_configured_labels() {
        let mapping = &ANALYSIS.spectral.interpretation;
        assert_eq!(interpret(0.3, mapping), (HurstRegime::MeanReverting, "Mean-reverting"));
        assert_eq!(interpret(0.5, mapping).0, HurstRegime::RandomWalk);
        assert_eq!(interpret(0.7, mapping).1, "Trending");
    }

    #[test]
    fn analyze_spectrum_reports_order_and_denoising() {
        let mut config = ANALYSIS.spectral.clone();
        config.denoise = true;
        let returns = synthetic::white_noise(300, 0.01, 4);
        let out = analyze_spectrum(&returns, Some(0.35), &config, SeriesInput::Raw).unwrap();
        assert_eq!(out.result.fractional_diff_order, Some(0.35));
        assert!(out.result.denoised);
        assert_eq!(out.denoised.unwrap().len(), 300);
        assert!((0.0..=1.0).contains(&out.result.hurst_exponent));
    }
}
