//! Fit-specific configuration and fit builder
use super::Fit;
use crate::{error::RuvResult, glm::Glm, model::Model, num::Float};
use ndarray::Array1;

/// A builder struct for fit configuration
pub struct FitConfig<'a, F, M>
where
    F: Float,
    M: Glm<F>,
{
    pub(crate) model: &'a Model<F, M>,
    pub options: FitOptions<F>,
}

impl<'a, F, M> FitConfig<'a, F, M>
where
    F: Float,
    M: Glm<F>,
{
    pub fn fit(self) -> RuvResult<Fit<'a, F, M>> {
        self.model.fit_with(self.options)
    }

    /// Use a maximum number of iterations
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.options.max_iter = max_iter;
        self
    }

    /// Set the tolerance of iteration
    pub fn tol(mut self, tol: F) -> Self {
        self.options.tol = tol;
        self
    }

    /// Use to set a L2 regularization parameter
    pub fn l2_reg(mut self, l2: F) -> Self {
        self.options.l2 = l2;
        self
    }

    /// Limit the number of step halvings per iteration
    pub fn max_step_halves(mut self, max_step_halves: usize) -> Self {
        self.options.max_step_halves = max_step_halves;
        self
    }

    /// Start the iteration from the given parameters
    pub fn init_guess(mut self, guess: Array1<F>) -> Self {
        self.options.init_guess = Some(guess);
        self
    }
}

/// Specifies the fitting options
#[derive(Clone, Debug)]
pub struct FitOptions<F>
where
    F: Float,
{
    /// The maximum number of IRLS iterations
    pub max_iter: usize,
    /// The relative tolerance of the likelihood
    pub tol: F,
    /// The L2 (ridge) regularization of the fit
    pub l2: F,
    /// The maximum number of step halvings in a single iteration
    pub max_step_halves: usize,
    /// An initial guess. A sensible default is selected if this is not provided.
    pub init_guess: Option<Array1<F>>,
}

impl<F> Default for FitOptions<F>
where
    F: Float,
{
    fn default() -> Self {
        Self {
            max_iter: 50,
            // A relative tolerance on the likelihood; count likelihoods are
            // large so this is looser than machine epsilon.
            tol: F::from(1e-10).unwrap(),
            l2: F::zero(),
            max_step_halves: 8,
            init_guess: None,
        }
    }
}
