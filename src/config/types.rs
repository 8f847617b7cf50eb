//! Small validated value types shared by the configuration blueprints.

use serde::{Deserialize, Serialize};

/// A non-negative vote weight.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Weight(f64);

impl Weight {
    pub const fn new(val: f64) -> Self {
        // NaN and negatives collapse to zero
        if val > 0.0 { Self(val) } else { Self(0.0) }
    }

    #[inline]
    pub const fn value(self) -> f64 {
        self.0
    }
}

/// A probability / significance level, clamped into [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prob(f64);

impl Prob {
    pub const fn new(val: f64) -> Self {
        let v = if val < 0.0 {
            0.0
        } else if val > 1.0 {
            1.0
        } else {
            val
        };
        Self(v)
    }

    #[inline]
    pub const fn value(self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_rejects_negative_values() {
        assert_eq!(Weight::new(-0.3).value(), 0.0);
        assert_eq!(Weight::new(0.25).value() * 2.0, 0.5);
    }

    #[test]
    fn prob_is_clamped() {
        assert_eq!(Prob::new(1.7).value(), 1.0);
        assert_eq!(Prob::new(-0.1).value(), 0.0);
        assert_eq!(Prob::new(0.05).value(), 0.05);
    }
}
