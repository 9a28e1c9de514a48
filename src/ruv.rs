//! Estimation of the factors of unwanted variation, W, and the counts with
//! that variation removed.
//!
//! All three estimators work on Y = log(x + epsilon) transposed to samples x
//! genes. They differ in which matrix the factors are read off:
//!
//! * [`ruv_g`] uses the log counts of negative control genes,
//! * [`ruv_s`] uses differences between replicate samples,
//! * [`ruv_r`] uses the residuals of a first-pass fit on the covariates of
//!   interest.
//!
//! W is estimated once and is meant to be added as covariates to the final
//! count model (see [`crate::de::augment_design`]). The normalized counts are
//! for exploration only.

pub mod control_genes;
pub mod replicates;
pub mod residuals;

pub use control_genes::ruv_g;
pub use replicates::{ruv_s, ReplicateGroups};
pub use residuals::{deviance_residuals, ruv_r, ResidualFit, ResidualOptions};

use crate::{counts::CountMatrix, transform::back_transform};
use ndarray::{Array1, Array2, ArrayView2};
use serde::Serialize;

/// Settings shared by the factor estimators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuvOptions {
    /// The number of factors of unwanted variation.
    pub k: usize,
    /// The number of leading singular vectors to skip, e.g. when the first
    /// factor is dominated by the biology. Not used by RUVs.
    pub drop: usize,
    /// Center the genes before the SVD. Not used by RUVs.
    pub center: bool,
    /// Round the normalized counts to whole numbers.
    pub round: bool,
    /// The pseudo-count added before taking logs.
    pub epsilon: f64,
    /// Singular values at or below this are treated as zero.
    pub tolerance: f64,
    /// The input is already on the log scale.
    pub is_log: bool,
}

impl Default for RuvOptions {
    fn default() -> Self {
        Self {
            k: 1,
            drop: 0,
            center: true,
            round: true,
            epsilon: 1.,
            tolerance: 1e-8,
            is_log: false,
        }
    }
}

impl RuvOptions {
    /// Default settings with `k` factors.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    pub fn drop(mut self, drop: usize) -> Self {
        self.drop = drop;
        self
    }

    pub fn center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }

    pub fn round(mut self, round: bool) -> Self {
        self.round = round;
        self
    }

    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn is_log(mut self, is_log: bool) -> Self {
        self.is_log = is_log;
        self
    }
}

/// The result of a factor estimation.
#[derive(Debug, Clone)]
pub struct RuvFit {
    /// The factors of unwanted variation, samples x factors.
    pub w: Array2<f64>,
    /// The coefficients of the factors for each gene, factors x genes.
    pub alpha: Array2<f64>,
    /// The counts with the unwanted variation removed, genes x samples.
    pub normalized: Array2<f64>,
    /// The number of factors in `w`.
    pub k: usize,
    /// All singular values of the decomposed matrix.
    pub singular_values: Array1<f64>,
}

impl RuvFit {
    pub fn w_names(&self) -> Vec<String> {
        w_names(self.k)
    }
}

/// Column names for the factors, `W_1` to `W_k`.
pub fn w_names(k: usize) -> Vec<String> {
    (1..=k).map(|i| format!("W_{}", i)).collect()
}

/// Return the corrected log-scale matrix (samples x genes) to the scale of
/// the input, genes x samples. Raw counts are back-transformed; data that
/// were given on the log scale, or are not whole numbers, stay on the log
/// scale.
fn corrected_counts(corrected: ArrayView2<f64>, counts: &CountMatrix, options: &RuvOptions) -> Array2<f64> {
    let is_log = options.is_log || counts.is_log_scale();
    if is_log && options.round {
        log::warn!("Can't round log scale data");
    }
    if !is_log && counts.is_whole_number() {
        back_transform(corrected.t(), options.epsilon, options.round)
    } else {
        corrected.t().to_owned()
    }
}
