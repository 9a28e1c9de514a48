//! Model for Poisson regression

use crate::{
    glm::Glm,
    math::{prod_log, y_log_mu},
    num::Float,
};

/// Poisson regression with the logarithmic link. This is the zero-dispersion
/// limit of the negative binomial and is used for moment estimates of the
/// dispersion.
#[derive(Debug, Clone, Copy, Default)]
pub struct Poisson;

impl<F: Float> Glm<F> for Poisson {
    /// The variance of a Poisson variable is equal to its mean.
    fn variance(&self, mean: F) -> F {
        mean
    }

    /// y * log(mu) - mu, dropping the log(y!) term.
    fn log_like(&self, y: F, mean: F) -> F {
        y_log_mu(y, mean) - mean
    }

    /// The saturation likelihood of the Poisson distribution is non-trivial.
    /// It is equal to y * (log(y) - 1).
    fn log_like_sat(&self, y: F) -> F {
        prod_log(y) - y
    }
}
