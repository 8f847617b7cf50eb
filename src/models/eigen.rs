use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipalComponent {
    /// 1-based rank by eigenvalue.
    pub rank: usize,
    pub eigenvalue: f64,
    pub explained_variance_ratio: f64,
    pub cumulative_variance_ratio: f64,
    /// `eigenvector * sqrt(eigenvalue)`, keyed by symbol. Largest magnitude is positive.
    pub loadings: BTreeMap<String, f64>,
}

/// Residual of an instrument after regressing its returns on the top factor returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SScore {
    /// Latest residual standardised by the trailing window's mean and sample deviation.
    pub current: f64,
    /// Share of return variance the factors explain.
    pub r_squared: f64,
    /// Regression coefficient on each factor, first component first.
    pub betas: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EigenportfolioResult {
    pub symbols: Vec<String>,
    /// Aligned return observations used for the correlation matrix.
    pub observations: usize,
    /// Every eigenvalue, descending.
    pub eigenvalues: Vec<f64>,
    pub explained_variance_ratio: Vec<f64>,
    pub cumulative_variance_ratio: Vec<f64>,
    /// The top-k components.
    pub components: Vec<PrincipalComponent>,
    pub s_score_window: usize,
    /// Instruments whose residual has dispersion over the window. Keyed by symbol.
    pub s_scores: BTreeMap<String, SScore>,
}
