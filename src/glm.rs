//! trait defining a count regression model and providing common functionality
//! Models are fit such that E[Y] = exp(X*B + offset), i.e. with the logarithmic
//! link that is standard for sequencing counts. Unlike the canonical-link case
//! the distribution can carry runtime parameters (the negative binomial
//! dispersion), so the trait methods take `&self`.

use crate::{
    error::RuvResult,
    fit::{options::FitOptions, Fit},
    irls::Irls,
    model::{Dataset, Model},
    num::Float,
    regularization::IrlsReg,
};
use ndarray::Array1;

/// Describes the response distribution of a log-link count GLM.
pub trait Glm<F: Float>: Sync {
    /// The variance as a function of the mean.
    fn variance(&self, mean: F) -> F;

    /// The log-likelihood of a single observation, up to terms depending only
    /// on y. The same terms must be dropped in `log_like_sat()` so that the
    /// deviance is exact.
    fn log_like(&self, y: F, mean: F) -> F;

    /// The log-likelihood of the saturated model, where the mean equals the
    /// observation.
    fn log_like_sat(&self, y: F) -> F;

    /// The IRLS weight for the log link, (d mu / d eta)^2 / var = mu^2 / var.
    fn irls_weight(&self, mean: F) -> F {
        let var = self.variance(mean);
        if var > F::zero() {
            mean * mean / var
        } else {
            F::zero()
        }
    }

    /// The unit deviance 2 * (l_sat - l). It is clamped at zero to absorb
    /// rounding near the saturated fit.
    fn deviance(&self, y: F, mean: F) -> F {
        let two = F::from(2.).unwrap();
        let dev = two * (self.log_like_sat(y) - self.log_like(y, mean));
        if dev > F::zero() {
            dev
        } else {
            F::zero()
        }
    }

    /// Sum of the log-likelihood terms given a vector of means.
    fn log_like_sum(&self, y: &Array1<F>, mean: &Array1<F>) -> F {
        y.iter()
            .zip(mean.iter())
            .fold(F::zero(), |acc, (&y, &mu)| acc + self.log_like(y, mu))
    }

    /// The regularized likelihood of the data given the parameters.
    fn log_like_reg(&self, data: &Dataset<F>, regressors: &Array1<F>, reg: &dyn IrlsReg<F>) -> F {
        let mean = data.mean(regressors);
        self.log_like_sum(&data.y, &mean) + reg.likelihood(regressors)
    }

    /// Perform the regression for the model and return a fit object holding
    /// the results.
    fn regression<'a>(
        &self,
        model: &'a Model<F, Self>,
        options: FitOptions<F>,
    ) -> RuvResult<Fit<'a, F, Self>>
    where
        Self: Sized,
    {
        let initial: Array1<F> = match &options.init_guess {
            Some(guess) => guess.clone(),
            None => model.data.initial_guess()?,
        };
        let reg = model.regularizer(options.l2);
        let initial_like = self.log_like_reg(&model.data, &initial, reg.as_ref());
        let mut irls: Irls<F, Self> =
            Irls::new(self, &model.data, initial.clone(), &options, reg, initial_like);

        let mut result = initial;
        let mut model_like = initial_like;
        for step in irls.by_ref() {
            let step = step?;
            log::trace!("IRLS step: like = {:?}, halvings = {}", step.like, step.steps - 1);
            result = step.guess;
            model_like = step.like;
        }
        let n_iter = irls.n_iter;
        Ok(Fit::new(model, result, model_like, n_iter))
    }
}
