//! Collect data for and configure a model

use crate::{
    error::{RuvError, RuvResult},
    fit::{
        options::{FitConfig, FitOptions},
        Fit,
    },
    glm::Glm,
    num::Float,
    regularization::{IrlsReg, Null, Ridge},
    response::Response,
    utility::one_pad,
};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_linalg::{DeterminantH, SolveH};
use std::marker::PhantomData;

/// The observations, design matrix, and linear offsets of a single regression.
pub struct Dataset<F>
where
    F: Float,
{
    /// the observation of response data by event
    pub y: Array1<F>,
    /// the design matrix with events in rows and instances in columns
    pub x: Array2<F>,
    /// The offset in the linear predictor for each data point, e.g. the log of
    /// the library size of each sample.
    pub linear_offset: Option<Array1<F>>,
}

impl<F> Dataset<F>
where
    F: Float,
{
    /// Returns the linear predictors, i.e. the design matrix multiplied by the
    /// regression parameters, plus the linear offsets if they are set.
    pub fn linear_predictor(&self, regressors: &Array1<F>) -> Array1<F> {
        let linear_predictor: Array1<F> = self.x.dot(regressors);
        if let Some(lin_offset) = &self.linear_offset {
            linear_predictor + lin_offset
        } else {
            linear_predictor
        }
    }

    /// The expected counts exp(eta). The linear predictor is clamped so that
    /// the exponential stays finite.
    pub fn mean(&self, regressors: &Array1<F>) -> Array1<F> {
        self.linear_predictor(regressors).mapv_into(clamped_exp)
    }

    /// A least-squares guess on the log scale, log(y + 1/10) - offset. This is
    /// much closer to the optimum than zero when counts are large.
    pub fn initial_guess(&self) -> RuvResult<Array1<F>> {
        let tenth = F::from(0.1).unwrap();
        let mut target: Array1<F> = self.y.mapv(|y| num_traits::Float::ln(y + tenth));
        if let Some(off) = &self.linear_offset {
            target -= off;
        }
        let xtx: Array2<F> = self.x.t().dot(&self.x);
        let xtz: Array1<F> = self.x.t().dot(&target);
        Ok(xtx.solveh_into(xtz)?)
    }
}

/// exp() with the argument bounded away from overflow.
fn clamped_exp<F: Float>(eta: F) -> F {
    let max_eta: F = num_traits::Float::ln(F::max_value()) - F::one();
    let eta = num_traits::Float::max(num_traits::Float::min(eta, max_eta), -max_eta);
    num_traits::Float::exp(eta)
}

/// Holds the data and configuration settings for a regression.
pub struct Model<F, M>
where
    F: Float,
    M: Glm<F>,
{
    /// the response distribution
    pub family: M,
    pub data: Dataset<F>,
    /// Whether the intercept term is used (commonly true)
    pub use_intercept: bool,
}

impl<F, M> Model<F, M>
where
    F: Float,
    M: Glm<F>,
{
    /// Perform the regression with the default options and return a fit
    /// object holding the results.
    pub fn fit(&self) -> RuvResult<Fit<'_, F, M>> {
        self.fit_options().fit()
    }

    /// Fit options can be adjusted on the returned configuration before
    /// calling `fit()` on it.
    pub fn fit_options(&self) -> FitConfig<'_, F, M> {
        FitConfig {
            model: self,
            options: FitOptions::default(),
        }
    }

    /// Fit with a complete set of options.
    pub fn fit_with(&self, options: FitOptions<F>) -> RuvResult<Fit<'_, F, M>> {
        self.family.regression(self, options)
    }

    /// Whether the first column of the design is the constant term, either
    /// added by the builder or supplied in the data.
    pub fn has_constant(&self) -> bool {
        self.use_intercept
            || (self.data.x.ncols() > 0 && self.data.x.column(0).iter().all(|&v| v == F::one()))
    }

    /// The ridge penalty for the IRLS. The constant term, if any, is never
    /// penalized.
    pub(crate) fn regularizer(&self, l2: F) -> Box<dyn IrlsReg<F>> {
        if l2 == F::zero() {
            return Box::new(Null {});
        }
        let mut l2_diag: Array1<F> = Array1::from_elem(self.data.x.ncols(), l2);
        if self.has_constant() {
            l2_diag[0] = F::zero();
        }
        Box::new(Ridge::from_diag(l2_diag))
    }
}

/// Provides an interface to create the full model option struct with convenient
/// type inference.
pub struct ModelBuilder<F, M> {
    _float: PhantomData<F>,
    _model: PhantomData<M>,
}

impl<F, M> ModelBuilder<F, M>
where
    F: Float,
    M: Glm<F>,
{
    /// Borrow the Y and X data where each row in the arrays is a new
    /// observation, using the default-constructed response family.
    pub fn data<'a, Y>(data_y: ArrayView1<'a, Y>, data_x: ArrayView2<'a, F>) -> ModelBuilderData<'a, F, M, Y>
    where
        M: Default,
        Y: Response + Copy,
    {
        Self::family(M::default(), data_y, data_x)
    }

    /// Borrow the Y and X data for a family that carries parameters, such as
    /// the negative binomial dispersion.
    pub fn family<'a, Y>(
        family: M,
        data_y: ArrayView1<'a, Y>,
        data_x: ArrayView2<'a, F>,
    ) -> ModelBuilderData<'a, F, M, Y>
    where
        Y: Response + Copy,
    {
        // the number of predictors
        let n_pred = data_x.ncols() + 1;
        ModelBuilderData {
            family,
            data_y,
            data_x,
            linear_offset: None,
            use_intercept_term: true,
            det_tol: default_epsilon::<F>(n_pred),
        }
    }
}

/// Holds the data and all the specifications for the model and provides
/// functions to adjust the settings.
pub struct ModelBuilderData<'a, F, M, Y>
where
    F: Float,
    M: Glm<F>,
    Y: Response + Copy,
{
    family: M,
    /// Observed response variable data where each entry is a new observation.
    data_y: ArrayView1<'a, Y>,
    /// Design matrix of observed covariate data where each row is a new
    /// observation and each column represents a different dependent variable.
    data_x: ArrayView2<'a, F>,
    /// The offset in the linear predictor for each data point.
    linear_offset: Option<Array1<F>>,
    /// Whether to use an intercept term. Defaults to `true`.
    use_intercept_term: bool,
    /// tolerance for determinant check on rank of data matrix X.
    det_tol: F,
}

impl<'a, F, M, Y> ModelBuilderData<'a, F, M, Y>
where
    F: Float,
    M: Glm<F>,
    Y: Response + Copy,
{
    /// Represents an offset added to the linear predictor for each data point.
    /// For counts this is typically the log of a normalization factor.
    pub fn linear_offset(mut self, linear_offset: Array1<F>) -> Self {
        self.linear_offset = Some(linear_offset);
        self
    }

    /// Do not add a constant term to the design matrix
    pub fn no_constant(mut self) -> Self {
        self.use_intercept_term = false;
        self
    }

    pub fn build(self) -> RuvResult<Model<F, M>> {
        let n_data = self.data_y.len();
        if n_data != self.data_x.nrows() {
            return Err(RuvError::BadInput(
                "y and x data must have same number of points".to_string(),
            ));
        }
        // If they are provided, check that the offsets have the correct number of entries
        if let Some(lin_off) = &self.linear_offset {
            if n_data != lin_off.len() {
                return Err(RuvError::BadInput(
                    "Offsets must have same dimension as observations".to_string(),
                ));
            }
            if lin_off.iter().any(|&o| !num_traits::Float::is_finite(o)) {
                return Err(RuvError::BadInput("Offsets must be finite".to_string()));
            }
        }

        // add constant term to X data
        let data_x: Array2<F> = if self.use_intercept_term {
            one_pad(self.data_x)
        } else {
            self.data_x.to_owned()
        };
        if data_x.ncols() == 0 {
            return Err(RuvError::BadInput("design has no columns".to_string()));
        }
        // Check if the data is under-constrained
        if n_data < data_x.ncols() {
            return Err(RuvError::Underconstrained);
        }

        // Check for co-linearity by ensuring that the determinant of X^T * X is non-zero.
        let xtx: Array2<F> = data_x.t().dot(&data_x);
        let det: F = F::from_real(xtx.deth()?);
        if num_traits::Float::abs(det) < self.det_tol {
            return Err(RuvError::ColinearData);
        }

        // convert to floating-point
        let data_y: Array1<F> = self
            .data_y
            .iter()
            .map(|&y| y.into_float())
            .collect::<Result<_, _>>()?;

        Ok(Model {
            family: self.family,
            data: Dataset {
                y: data_y,
                x: data_x,
                linear_offset: self.linear_offset,
            },
            use_intercept: self.use_intercept_term,
        })
    }
}

/// Default tolerance for colinearity checking.
/// Uses the square root of the number of data points times machine epsilon.
fn default_epsilon<F: Float>(n_data: usize) -> F {
    let sqrt_n: F = num_traits::Float::sqrt(F::from(n_data).unwrap());
    sqrt_n * F::epsilon()
}
