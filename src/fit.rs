//! struct holding the fit result of a regression

pub mod options;

use crate::{glm::Glm, math::sign, model::Model, num::Float};
use ndarray::{Array1, Zip};

/// The result of a successful GLM fit.
pub struct Fit<'a, F, M>
where
    F: Float,
    M: Glm<F>,
{
    /// The model that was fit, holding the data and the response family.
    pub model: &'a Model<F, M>,
    /// The parameter values that maximize the (regularized) likelihood
    pub result: Array1<F>,
    /// The regularized log-likelihood at the result
    pub model_like: F,
    /// The number of IRLS iterations taken
    pub n_iter: usize,
}

impl<'a, F, M> Fit<'a, F, M>
where
    F: Float,
    M: Glm<F>,
{
    pub(crate) fn new(model: &'a Model<F, M>, result: Array1<F>, model_like: F, n_iter: usize) -> Self {
        Self {
            model,
            result,
            model_like,
            n_iter,
        }
    }

    /// The number of data points minus the number of free parameters.
    pub fn ndf(&self) -> usize {
        self.model.data.y.len() - self.result.len()
    }

    /// The expected counts given the fit parameters.
    pub fn fitted(&self) -> Array1<F> {
        self.model.data.mean(&self.result)
    }

    /// The log-likelihood without any regularization term. Terms depending
    /// only on the data are left out, so only differences between fits to
    /// the same data are meaningful.
    pub fn log_like(&self) -> F {
        self.model
            .family
            .log_like_sum(&self.model.data.y, &self.fitted())
    }

    /// The total deviance, twice the difference from the saturated likelihood.
    pub fn deviance(&self) -> F {
        self.unit_deviances().sum()
    }

    /// sign(y - mu) * sqrt(d(y, mu)) for each observation.
    pub fn deviance_residuals(&self) -> Array1<F> {
        let mu = self.fitted();
        let family = &self.model.family;
        Zip::from(&self.model.data.y)
            .and(&mu)
            .map_collect(|&y, &mu| sign(y - mu) * num_traits::Float::sqrt(family.deviance(y, mu)))
    }

    /// (y - mu) / sqrt(var(mu)) for each observation.
    pub fn pearson_residuals(&self) -> Array1<F> {
        let mu = self.fitted();
        let family = &self.model.family;
        Zip::from(&self.model.data.y).and(&mu).map_collect(|&y, &mu| {
            let var = family.variance(mu);
            if var > F::zero() {
                (y - mu) / num_traits::Float::sqrt(var)
            } else {
                F::zero()
            }
        })
    }

    /// Perform a likelihood-ratio test against a fit of a nested model to the
    /// same data, returning the statistic 2 * (l_full - l_reduced). It is
    /// asymptotically chi-squared with the difference in parameter counts as
    /// degrees of freedom.
    pub fn lr_test_against<N: Glm<F>>(&self, reduced: &Fit<'_, F, N>) -> F {
        let two = F::from(2.).unwrap();
        two * (self.log_like() - reduced.log_like())
    }

    fn unit_deviances(&self) -> Array1<F> {
        let mu = self.fitted();
        let family = &self.model.family;
        Zip::from(&self.model.data.y)
            .and(&mu)
            .map_collect(|&y, &mu| family.deviance(y, mu))
    }
}
