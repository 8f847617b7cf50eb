//! Blends analyzer outputs into a single BUY / SELL / HOLD recommendation.
//!
//! Vote mapping (each vote in [-1, 1]):
//! - Hurst: trending (H above the trending cut-off) votes with the sign of the momentum-window
//!   return. Mean-reverting (H below the mean-reverting cut-off) votes against the price z-score,
//!   saturating at `zscore_saturation`. A random walk abstains with 0.
//! - Regime: a Bull or Bear current state with posterior above `regime_min_posterior` votes ±1.
//! - Momentum: annualised Sharpe above `strong_sharpe` votes +1 (a falling window softens it
//!   to +0.5). Below `weak_sharpe` votes -1 (or -0.5 when the window is still up).
//! - Volatility: annualised volatility above `high_volatility` votes `-volatility_vote`, below
//!   `low_volatility` votes `+volatility_vote`.
//! - Stationarity: a non-stationary series votes with a window move beyond `trend_return`. A
//!   stationary one votes against a move beyond `reversion_return`. Inconclusive abstains.
//!
//! A missing input is "no opinion". Its weight leaves both numerator and denominator.

use itertools::Itertools;
use strum::IntoEnumIterator;

use crate::config::SynthesisConfig;
use crate::models::{
    Factor, HurstRegime, Momentum, Recommendation, RegimeDirection, RegimeResult, Signal,
    SignalProcessingResult, Stance, StationarityResult, StationarityVerdict, Vote, VolatilityResult,
};

/// Borrowed analyzer outputs for one symbol. Any of them may be absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynthesisInputs<'a> {
    pub stationarity: Option<&'a StationarityResult>,
    pub volatility: Option<&'a VolatilityResult>,
    pub regime: Option<&'a RegimeResult>,
    pub signal_processing: Option<&'a SignalProcessingResult>,
    pub momentum: Option<&'a Momentum>,
}

/// Pure and deterministic: equal inputs give an equal `Recommendation`, reasoning included.
pub fn synthesize(inputs: &SynthesisInputs<'_>, config: &SynthesisConfig) -> Recommendation {
    let votes: Vec<Vote> = Factor::iter()
        .filter_map(|factor| cast_vote(factor, inputs, config))
        .filter(|v| v.weight > 0.0)
        .collect();
    let unavailable: Vec<Factor> = Factor::iter()
        .filter(|f| !votes.iter().any(|v| v.factor == *f))
        .collect();

    let available_weight: f64 = votes.iter().map(|v| v.weight).sum();
    let total_weight = config.weights.total();

    if votes.is_empty() || available_weight <= 0.0 || total_weight <= 0.0 {
        return Recommendation {
            recommendation: Signal::Hold,
            confidence: 0.0,
            signal_strength: 0.0,
            reasoning: "No analyzer produced a usable signal; holding by default.".to_string(),
            votes,
            unavailable,
        };
    }

    let weighted: f64 = votes.iter().map(Vote::contribution).sum();
    let gross: f64 = votes.iter().map(|v| v.contribution().abs()).sum();
    let signal_strength = (weighted / available_weight).clamp(-1.0, 1.0);

    let agreement = if gross > 0.0 { weighted.abs() / gross } else { 1.0 };
    let coverage = (available_weight / total_weight).min(1.0);
    let confidence = (100.0 * agreement * coverage.sqrt()).clamp(0.0, 100.0);

    let recommendation = if signal_strength > config.buy_threshold {
        Signal::Buy
    } else if signal_strength < config.sell_threshold {
        Signal::Sell
    } else {
        Signal::Hold
    };

    let reasoning = reasoning(
        recommendation,
        signal_strength,
        confidence,
        coverage,
        &votes,
        &unavailable,
        config,
    );

    Recommendation {
        recommendation,
        confidence,
        signal_strength,
        reasoning,
        votes,
        unavailable,
    }
}

fn cast_vote(factor: Factor, inputs: &SynthesisInputs<'_>, config: &SynthesisConfig) -> Option<Vote> {
    let w = &config.weights;
    match factor {
        Factor::Hurst => {
            let sp = inputs.signal_processing?;
            let m = inputs.momentum?;
            let h = sp.hurst_exponent;
            let (value, stance, detail) = match sp.hurst_regime {
                HurstRegime::MeanReverting => {
                    let value = -(m.zscore / config.zscore_saturation).clamp(-1.0, 1.0);
                    (
                        value,
                        Stance::Contrarian,
                        format!("mean-reverting Hurst {:.2} against z-score {:+.2}", h, m.zscore),
                    )
                }
                HurstRegime::Trending => (
                    sign(m.window_return),
                    Stance::TrendFollowing,
                    format!(
                        "trending Hurst {:.2} with a {:+.2}% move",
                        h,
                        m.window_return * 100.0
                    ),
                ),
                HurstRegime::RandomWalk => (
                    0.0,
                    Stance::Neutral,
                    format!("random-walk Hurst {:.2}", h),
                ),
            };
            Some(vote(factor, value, w.hurst.value(), stance, detail))
        }
        Factor::Regime => {
            let regime = inputs.regime?;
            let state = regime.current_state()?;
            let posterior = regime.current_posterior();
            let confident = posterior > config.regime_min_posterior.value();
            let value = match state.direction {
                RegimeDirection::Bull if confident => 1.0,
                RegimeDirection::Bear if confident => -1.0,
                _ => 0.0,
            };
            let stance = if value == 0.0 { Stance::Neutral } else { Stance::TrendFollowing };
            let detail = format!("{} regime (p={:.2})", state.label, posterior);
            Some(vote(factor, value, w.regime.value(), stance, detail))
        }
        Factor::Momentum => {
            let m = inputs.momentum?;
            let value = if m.sharpe > config.strong_sharpe {
                if m.window_return > 0.0 { 1.0 } else { 0.5 }
            } else if m.sharpe < config.weak_sharpe {
                if m.window_return < 0.0 { -1.0 } else { -0.5 }
            } else {
                0.0
            };
            let stance = if value == 0.0 { Stance::Neutral } else { Stance::TrendFollowing };
            let detail = format!(
                "Sharpe {:.2} with a {:+.2}% move",
                m.sharpe,
                m.window_return * 100.0
            );
            Some(vote(factor, value, w.momentum.value(), stance, detail))
        }
        Factor::Volatility => {
            let v = inputs.volatility?;
            let annual = v.annualized_volatility;
            if !annual.is_finite() {
                return None;
            }
            let value = if annual > config.high_volatility {
                -config.volatility_vote
            } else if annual < config.low_volatility {
                config.volatility_vote
            } else {
                0.0
            };
            let stance = if value == 0.0 { Stance::Neutral } else { Stance::RiskAdjustment };
            let detail = format!("{} annualised volatility {:.1}%", v.model_type, annual * 100.0);
            Some(vote(factor, value, w.volatility.value(), stance, detail))
        }
        Factor::Stationarity => {
            let s = inputs.stationarity?;
            let m = inputs.momentum?;
            let r = m.window_return;
            let (value, stance) = match s.verdict {
                StationarityVerdict::NonStationary if r.abs() > config.trend_return => {
                    (sign(r), Stance::TrendFollowing)
                }
                StationarityVerdict::Stationary if r.abs() > config.reversion_return => {
                    (-sign(r), Stance::Contrarian)
                }
                _ => (0.0, Stance::Neutral),
            };
            let detail = format!("{} (ADF p={:.3})", s.verdict, s.adf_pvalue);
            Some(vote(factor, value, w.stationarity.value(), stance, detail))
        }
    }
}

fn vote(factor: Factor, value: f64, weight: f64, stance: Stance, detail: String) -> Vote {
    Vote {
        factor,
        value: value.clamp(-1.0, 1.0),
        weight,
        stance,
        detail,
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn reasoning(
    signal: Signal,
    strength: f64,
    confidence: f64,
    coverage: f64,
    votes: &[Vote],
    unavailable: &[Factor],
    config: &SynthesisConfig,
) -> String {
    let level = if confidence >= config.high_confidence { "high" } else { "low" };
    let drivers = votes
        .iter()
        .sorted_by(|a, b| {
            b.contribution()
                .abs()
                .total_cmp(&a.contribution().abs())
                .then(a.factor.cmp(&b.factor))
        })
        .take(config.max_reasons)
        .map(|v| format!("{} {:+.2} ({})", v.factor, v.value, v.detail))
        .join("; ");

    let mut sentence = format!(
        "{} with {} confidence ({:.1}), signal strength {:+.2}. Dominant factors: {}.",
        signal, level, confidence, strength, drivers
    );
    if !unavailable.is_empty() {
        sentence.push_str(&format!(
            " Unavailable: {} (coverage {:.0}%).",
            unavailable.iter().join(", "),
            coverage * 100.0
        ));
    }
    sentence
}
