//! Fit the same count GLM to every gene of a count matrix.

use crate::{
    error::{RuvError, RuvResult},
    fit::options::FitOptions,
    glm::Glm,
    model::ModelBuilder,
    response::Poisson,
};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

/// The ridge penalty of the second attempt at a gene whose plain fit fails.
const RETRY_L2: f64 = 1e-4;

/// Per-gene results of fitting a design to a genes x samples count matrix.
#[derive(Debug, Clone)]
pub struct GeneFits {
    /// Coefficients, one column per gene (p x genes). Genes without any reads
    /// have no finite estimate and hold NaN.
    pub coefficients: Array2<f64>,
    /// The expected counts, genes x samples.
    pub fitted: Array2<f64>,
    /// Deviance residuals, genes x samples.
    pub deviance_residuals: Array2<f64>,
    /// The log-likelihood of each gene, up to terms that only depend on the
    /// counts.
    pub log_like: Array1<f64>,
    pub deviance: Array1<f64>,
    /// Whether the unpenalized fit of each gene converged.
    pub converged: Vec<bool>,
}

impl GeneFits {
    pub fn n_failed(&self) -> usize {
        self.converged.iter().filter(|&&c| !c).count()
    }
}

/// The outcome for a single gene.
struct GeneFit {
    coefficients: Array1<f64>,
    fitted: Array1<f64>,
    residuals: Array1<f64>,
    log_like: f64,
    deviance: f64,
    converged: bool,
}

impl GeneFit {
    /// A gene without reads: the fitted means are zero and fit the data
    /// exactly.
    fn unexpressed(n_samples: usize, n_params: usize) -> Self {
        Self {
            coefficients: Array1::from_elem(n_params, f64::NAN),
            fitted: Array1::zeros(n_samples),
            residuals: Array1::zeros(n_samples),
            log_like: 0.,
            deviance: 0.,
            converged: true,
        }
    }
}

fn is_fit_failure(err: &RuvError) -> bool {
    matches!(err, RuvError::MaxIter(_) | RuvError::LinalgError { .. })
}

fn fit_gene<M>(
    y: ArrayView1<f64>,
    x: ArrayView2<f64>,
    offset: Option<ArrayView1<f64>>,
    family: &M,
    options: &FitOptions<f64>,
) -> RuvResult<GeneFit>
where
    M: Glm<f64> + Clone,
{
    if y.iter().all(|&v| v == 0.) {
        return Ok(GeneFit::unexpressed(y.len(), x.ncols()));
    }
    let mut builder = ModelBuilder::family(family.clone(), y.view(), x.view()).no_constant();
    if let Some(off) = offset {
        builder = builder.linear_offset(off.to_owned());
    }
    let model = builder.build()?;

    let (fit, converged) = match model.fit_with(options.clone()) {
        Ok(fit) => (fit, true),
        Err(err) if is_fit_failure(&err) => {
            log::debug!("Retrying a gene fit with a ridge penalty after: {}", err);
            let ridged = FitOptions {
                l2: options.l2.max(RETRY_L2),
                init_guess: None,
                ..options.clone()
            };
            match model.fit_with(ridged) {
                Ok(fit) => (fit, false),
                Err(err) if is_fit_failure(&err) => {
                    return Ok(GeneFit {
                        coefficients: Array1::from_elem(x.ncols(), f64::NAN),
                        fitted: Array1::from_elem(y.len(), f64::NAN),
                        residuals: Array1::zeros(y.len()),
                        log_like: f64::NAN,
                        deviance: f64::NAN,
                        converged: false,
                    })
                }
                Err(err) => return Err(err),
            }
        }
        Err(err) => return Err(err),
    };
    Ok(GeneFit {
        fitted: fit.fitted(),
        residuals: fit.deviance_residuals(),
        log_like: fit.log_like(),
        deviance: fit.deviance(),
        coefficients: fit.result,
        converged,
    })
}

/// Fit the design `x` (samples x p, including any intercept column) to each
/// gene of `counts` (genes x samples), with optional log offsets of the same
/// shape as the counts. Genes are fit in parallel; the results are in gene
/// order.
///
/// A gene whose fit fails to converge is refit with a small ridge penalty and
/// flagged in `converged`. If that fails too its residuals are set to zero.
pub fn fit_genes<M>(
    counts: ArrayView2<f64>,
    x: ArrayView2<f64>,
    offsets: Option<ArrayView2<f64>>,
    family: &M,
    options: &FitOptions<f64>,
) -> RuvResult<GeneFits>
where
    M: Glm<f64> + Clone,
{
    let (n_genes, n_samples) = counts.dim();
    if x.nrows() != n_samples {
        return Err(RuvError::BadInput(format!(
            "design has {} rows for {} samples",
            x.nrows(),
            n_samples
        )));
    }
    if let Some(off) = offsets {
        if off.dim() != counts.dim() {
            return Err(RuvError::BadInput(format!(
                "offsets are {:?} but counts are {:?}",
                off.dim(),
                counts.dim()
            )));
        }
    }
    let n_params = x.ncols();

    let results: Vec<GeneFit> = (0..n_genes)
        .into_par_iter()
        .map(|g| {
            let offset = offsets.as_ref().map(|off| off.row(g));
            fit_gene(counts.row(g), x, offset, family, options)
        })
        .collect::<RuvResult<_>>()?;

    let mut fits = GeneFits {
        coefficients: Array2::zeros((n_params, n_genes)),
        fitted: Array2::zeros((n_genes, n_samples)),
        deviance_residuals: Array2::zeros((n_genes, n_samples)),
        log_like: Array1::zeros(n_genes),
        deviance: Array1::zeros(n_genes),
        converged: Vec::with_capacity(n_genes),
    };
    for (g, res) in results.into_iter().enumerate() {
        fits.coefficients.column_mut(g).assign(&res.coefficients);
        fits.fitted.row_mut(g).assign(&res.fitted);
        fits.deviance_residuals.row_mut(g).assign(&res.residuals);
        fits.log_like[g] = res.log_like;
        fits.deviance[g] = res.deviance;
        fits.converged.push(res.converged);
    }
    let n_failed = fits.n_failed();
    if n_failed > 0 {
        log::warn!("{} of {} gene fits did not converge", n_failed, n_genes);
    }
    Ok(fits)
}

/// A common negative binomial dispersion from Poisson fits of every gene.
/// Each expressed gene contributes the pooled moment estimate
/// (n / (n - p) * sum (y - mu)^2 - sum mu) / sum mu^2, so that samples with
/// vanishing fitted means (a group without reads) carry no weight. The common
/// value is the mean of those estimates, clipped at zero.
pub fn estimate_common_dispersion(
    counts: ArrayView2<f64>,
    x: ArrayView2<f64>,
    offsets: Option<ArrayView2<f64>>,
) -> RuvResult<f64> {
    let n_samples = counts.ncols();
    if n_samples <= x.ncols() {
        return Err(RuvError::Underconstrained);
    }
    let df_scale = n_samples as f64 / (n_samples - x.ncols()) as f64;
    let fits = fit_genes(counts, x, offsets, &Poisson, &FitOptions::default())?;

    let estimates: Vec<f64> = counts
        .axis_iter(Axis(0))
        .zip(fits.fitted.axis_iter(Axis(0)))
        .filter_map(|(y, mu)| {
            if mu.iter().any(|m| !m.is_finite()) {
                return None;
            }
            let sum_sq_mu = mu.dot(&mu);
            if sum_sq_mu <= 0. {
                return None;
            }
            let rss: f64 = y.iter().zip(mu.iter()).map(|(&y, &mu)| (y - mu).powi(2)).sum();
            Some((df_scale * rss - mu.sum()) / sum_sq_mu)
        })
        .collect();
    if estimates.is_empty() {
        return Err(RuvError::InvalidCounts(
            "no expressed genes to estimate a dispersion from".to_string(),
        ));
    }
    let mean = estimates.iter().sum::<f64>() / estimates.len() as f64;
    let dispersion = mean.max(0.);
    log::info!(
        "Common dispersion {:.4} from {} genes",
        dispersion,
        estimates.len()
    );
    Ok(dispersion)
}
