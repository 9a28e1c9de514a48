//! Reweighted least squares for the log-link count families
use crate::{
    error::{RuvError, RuvResult},
    fit::options::FitOptions,
    glm::Glm,
    model::Dataset,
    num::Float,
    regularization::IrlsReg,
};
use ndarray::{Array1, Array2, Zip};
use ndarray_linalg::SolveH;

/// Yields one accepted coefficient update per item until the relative change
/// in the penalized likelihood falls below the tolerance.
pub struct Irls<'a, F, M>
where
    F: Float,
    M: Glm<F>,
{
    family: &'a M,
    data: &'a Dataset<F>,
    guess: Array1<F>,
    options: &'a FitOptions<F>,
    reg: Box<dyn IrlsReg<F>>,
    /// Iterations so far, counting step-halving trials
    pub n_iter: usize,
    /// Penalized likelihood of `guess`
    last_like: F,
    /// Set once an update within tolerance has been returned.
    done: bool,
}

impl<'a, F, M> Irls<'a, F, M>
where
    F: Float,
    M: Glm<F>,
{
    pub fn new(
        family: &'a M,
        data: &'a Dataset<F>,
        initial: Array1<F>,
        options: &'a FitOptions<F>,
        reg: Box<dyn IrlsReg<F>>,
        initial_like: F,
    ) -> Self {
        Self {
            family,
            data,
            guess: initial,
            options,
            reg,
            n_iter: 0,
            last_like: initial_like,
            done: false,
        }
    }

    /// Accept `next_guess`, counting `extra_iter` halving trials towards the
    /// iteration limit.
    fn step_with(
        &mut self,
        next_guess: Array1<F>,
        next_like: F,
        extra_iter: usize,
    ) -> <Self as Iterator>::Item {
        let n_steps: usize = 1 + extra_iter;
        self.guess.assign(&next_guess);
        self.last_like = next_like;
        self.n_iter += n_steps;
        if self.n_iter > self.options.max_iter {
            return Err(RuvError::MaxIter(self.options.max_iter));
        }
        Ok(IrlsStep {
            guess: next_guess,
            like: next_like,
            steps: n_steps,
        })
    }

    /// Returns the (LHS, RHS) of the IRLS update matrix equation,
    /// (X^T W X) beta = X^T W z, where z is the working response without the
    /// linear offsets.
    fn irls_mat_vec(&self) -> (Array2<F>, Array1<F>) {
        // offsets are folded into the mean but not the working response
        let eta_no_offset: Array1<F> = self.data.x.dot(&self.guess);
        let mean: Array1<F> = self.data.mean(&self.guess);

        // For the log link d mu / d eta = mu, so the working response is
        // eta + (y - mu) / mu. The weights are conditioned so that the
        // Hessian stays positive-definite when means underflow.
        let weights: Array1<F> = mean.mapv(|mu| self.family.irls_weight(mu) + F::epsilon());
        let working: Array1<F> = Zip::from(&eta_no_offset)
            .and(&self.data.y)
            .and(&mean)
            .map_collect(|&eta, &y, &mu| {
                if mu > F::zero() {
                    eta + (y - mu) / mu
                } else {
                    eta
                }
            });

        // Fisher information X' W X
        let neg_hessian: Array2<F> = (&self.data.x.t() * &weights).dot(&self.data.x);
        let rhs: Array1<F> = self.data.x.t().dot(&(weights * working));
        (neg_hessian, rhs)
    }
}

/// An accepted update.
pub struct IrlsStep<F> {
    pub guess: Array1<F>,
    /// Penalized log-likelihood of `guess`
    pub like: F,
    /// 1 plus the number of step-halving trials
    pub steps: usize,
}

impl<'a, F, M> Irls<'a, F, M>
where
    F: Float,
    M: Glm<F>,
{
    fn penalized_like(&self, beta: &Array1<F>) -> F {
        self.family.log_like_reg(self.data, beta, self.reg.as_ref())
    }

    /// Change in the likelihood relative to its magnitude. Positive when the
    /// candidate improves on the last accepted guess.
    fn relative_gain(&self, like: F) -> F {
        (like - self.last_like) / (F::epsilon() + num_traits::Float::abs(like))
    }

    /// Move from the current guess towards `full_step` by successively
    /// smaller fractions while the likelihood is still below the last one.
    /// Returns the best candidate, its likelihood, its gain and the number of
    /// trials.
    fn halve_step(&self, full_step: Array1<F>, full_like: F) -> (Array1<F>, F, F, usize) {
        let half = F::from(0.5).unwrap();
        let (mut best, mut best_like) = (full_step, full_like);
        let mut gain = self.relative_gain(best_like);
        let mut fraction = half;
        let mut trials = 0;
        while gain < -self.options.tol && trials < self.options.max_step_halves {
            let candidate = best.mapv(|b| b * fraction) + self.guess.mapv(|g| g * (F::one() - fraction));
            let candidate_like = self.penalized_like(&candidate);
            let candidate_gain = self.relative_gain(candidate_like);
            if candidate_gain >= gain {
                best = candidate;
                best_like = candidate_like;
                gain = candidate_gain;
                fraction = half;
            } else {
                fraction = fraction * half;
            }
            trials += 1;
        }
        (best, best_like, gain, trials)
    }
}

impl<'a, F, M> Iterator for Irls<'a, F, M>
where
    F: Float,
    M: Glm<F>,
{
    type Item = RuvResult<IrlsStep<F>>;

    /// Solve the penalized weighted least-squares problem at the current
    /// guess and accept the result if it raises the likelihood.
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let (irls_mat, irls_vec) = self.irls_mat_vec();
        let lhs = self.reg.irls_mat(irls_mat, &self.guess);
        let rhs = self.reg.irls_vec(irls_vec, &self.guess);
        let next_guess: Array1<F> = match lhs.solveh_into(rhs) {
            Ok(solution) => solution,
            Err(err) => return Some(Err(err.into())),
        };
        let next_like = self.penalized_like(&next_guess);
        let gain = self.relative_gain(next_like);

        if gain > self.options.tol {
            return Some(self.step_with(next_guess, next_like, 0));
        }
        if num_traits::Float::abs(gain) <= self.options.tol {
            // Converged. A non-negative gain is still reported once so that a
            // fit started at the optimum has a step to return.
            if gain >= F::zero() {
                self.done = true;
                return Some(self.step_with(next_guess, next_like, 0));
            }
            return None;
        }

        let (guess, like, gain, trials) = self.halve_step(next_guess, next_like);
        if gain > F::zero() {
            Some(self.step_with(guess, like, trials))
        } else {
            log::debug!("IRLS stopped after failing to improve the likelihood");
            None
        }
    }
}
