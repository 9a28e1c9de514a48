//! Model for negative binomial regression with a known dispersion

use crate::{
    error::{RuvError, RuvResult},
    glm::Glm,
    math::{prod_log, y_log_mu},
    num::Float,
};

/// Negative binomial regression with the logarithmic link. The variance is
/// mu + phi * mu^2 where phi is the dispersion, held fixed during the fit.
#[derive(Debug, Clone, Copy)]
pub struct NegativeBinomial<F> {
    dispersion: F,
}

impl<F: Float> NegativeBinomial<F> {
    /// A zero dispersion is accepted and reduces to the Poisson model.
    pub fn new(dispersion: F) -> RuvResult<Self> {
        if !num_traits::Float::is_finite(dispersion) || dispersion < F::zero() {
            return Err(RuvError::BadInput(format!(
                "dispersion must be finite and non-negative, got {:?}",
                dispersion
            )));
        }
        Ok(Self { dispersion })
    }

    pub fn dispersion(&self) -> F {
        self.dispersion
    }
}

impl<F: Float> Glm<F> for NegativeBinomial<F> {
    fn variance(&self, mean: F) -> F {
        mean + self.dispersion * mean * mean
    }

    /// With size r = 1/phi the likelihood is, up to gamma-function terms of y
    /// and r, y log(mu) - (y + r) log(mu + r) + r log(r).
    fn log_like(&self, y: F, mean: F) -> F {
        if self.dispersion == F::zero() {
            return y_log_mu(y, mean) - mean;
        }
        let r = num_traits::Float::recip(self.dispersion);
        y_log_mu(y, mean) - (y + r) * num_traits::Float::ln(mean + r) + prod_log(r)
    }

    fn log_like_sat(&self, y: F) -> F {
        if self.dispersion == F::zero() {
            return prod_log(y) - y;
        }
        let r = num_traits::Float::recip(self.dispersion);
        prod_log(y) - prod_log(y + r) + prod_log(r)
    }
}
