//! Penalties on the coefficients of a count GLM and how they enter the IRLS
//! normal equations.
use crate::num::Float;
use ndarray::{Array1, Array2};

/// A smooth penalty subtracted from the log-likelihood.
pub trait IrlsReg<F>
where
    F: Float,
{
    /// The (non-positive) contribution to the penalized log-likelihood. Zero
    /// coefficients carry no penalty.
    fn likelihood(&self, regressors: &Array1<F>) -> F;
    /// Adjust the right-hand side X' W z of the update.
    fn irls_vec(&self, vec: Array1<F>, regressors: &Array1<F>) -> Array1<F>;
    /// Adjust the information matrix X' W X of the update by the Hessian of
    /// the penalty.
    fn irls_mat(&self, mat: Array2<F>, regressors: &Array1<F>) -> Array2<F>;
}

/// Unpenalized maximum likelihood.
pub struct Null {}

impl<F: Float> IrlsReg<F> for Null {
    #[inline]
    fn likelihood(&self, _: &Array1<F>) -> F {
        F::zero()
    }
    #[inline]
    fn irls_vec(&self, vec: Array1<F>, _: &Array1<F>) -> Array1<F> {
        vec
    }
    #[inline]
    fn irls_mat(&self, mat: Array2<F>, _: &Array1<F>) -> Array2<F> {
        mat
    }
}

/// L2 penalty 0.5 * sum_i l2_i * beta_i^2. Keeps the coefficients of a gene
/// finite when one group has no reads.
pub struct Ridge<F: Float> {
    l2_vec: Array1<F>,
}

impl<F: Float> Ridge<F> {
    /// One strength per coefficient; a zero leaves that coefficient (usually
    /// the intercept) free.
    pub fn from_diag(l2: Array1<F>) -> Self {
        Self { l2_vec: l2 }
    }
}

impl<F: Float> IrlsReg<F> for Ridge<F> {
    fn likelihood(&self, beta: &Array1<F>) -> F {
        let half = F::from(0.5).unwrap();
        -half * self.l2_vec.iter().zip(beta.iter()).fold(F::zero(), |acc, (&l, &b)| acc + l * b * b)
    }
    /// The penalty's gradient at the current guess cancels against its
    /// Hessian term, so the right-hand side is unchanged.
    #[inline]
    fn irls_vec(&self, vec: Array1<F>, _: &Array1<F>) -> Array1<F> {
        vec
    }
    fn irls_mat(&self, mut mat: Array2<F>, _: &Array1<F>) -> Array2<F> {
        mat.diag_mut().zip_mut_with(&self.l2_vec, |m, &l| *m = *m + l);
        mat
    }
}
