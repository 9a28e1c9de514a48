//! RUVr: factors from the residuals of a first-pass count model

use super::{corrected_counts, RuvFit, RuvOptions};
use crate::{
    counts::CountMatrix,
    error::{RuvError, RuvResult},
    factor::{left_singular_vectors, regress_out},
    fit::options::FitOptions,
    genewise::{estimate_common_dispersion, fit_genes, GeneFits},
    normalize::{glm_offsets, NormalizationMethod},
    response::NegativeBinomial,
    transform::center_columns,
    utility::select_columns,
};
use ndarray::{Array2, ArrayView2};

/// Estimate W from residuals of a fit of the counts on the covariates of
/// interest, e.g. the deviance residuals from [`deviance_residuals`].
/// `residuals` has the shape of the counts, genes x samples. The factors are
/// the leading left singular vectors of the (centered) control-gene
/// residuals, and the log counts are regressed on them.
pub fn ruv_r(
    counts: &CountMatrix,
    control_genes: &[usize],
    residuals: ArrayView2<f64>,
    options: &RuvOptions,
) -> RuvResult<RuvFit> {
    if residuals.dim() != counts.counts().dim() {
        return Err(RuvError::BadInput(format!(
            "residuals are {:?} but counts are {:?}",
            residuals.dim(),
            counts.counts().dim()
        )));
    }
    if control_genes.is_empty() {
        return Err(RuvError::NoControls("genes"));
    }
    let y: Array2<f64> = counts.log_samples_by_genes(options.epsilon, options.is_log);
    let resid_controls = select_columns(residuals.t(), control_genes, "genes")?;
    let resid_controls = if options.center {
        center_columns(resid_controls.view())
    } else {
        resid_controls
    };

    let svd = left_singular_vectors(resid_controls.view(), options.k, options.drop, options.tolerance)?;
    let w = svd.vectors;
    let (alpha, corrected) = regress_out(y.view(), w.view())?;
    log::info!(
        "RUVr: {} factor(s) from the residuals of {} genes",
        w.ncols(),
        control_genes.len()
    );
    Ok(RuvFit {
        normalized: corrected_counts(corrected.view(), counts, options),
        k: w.ncols(),
        w,
        alpha,
        singular_values: svd.singular_values,
    })
}

/// Settings of the first-pass fit that produces residuals for RUVr.
#[derive(Debug, Clone)]
pub struct ResidualOptions {
    /// The negative binomial dispersion. A common dispersion is estimated
    /// from the data when it is not given.
    pub dispersion: Option<f64>,
    /// The normalization carried into the fit as offsets.
    pub normalization: NormalizationMethod,
    pub fit: FitOptions<f64>,
}

impl Default for ResidualOptions {
    fn default() -> Self {
        Self {
            dispersion: None,
            normalization: NormalizationMethod::Upper,
            fit: FitOptions::default(),
        }
    }
}

impl ResidualOptions {
    pub fn dispersion(mut self, dispersion: f64) -> Self {
        self.dispersion = Some(dispersion);
        self
    }

    pub fn normalization(mut self, normalization: NormalizationMethod) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn fit_options(mut self, fit: FitOptions<f64>) -> Self {
        self.fit = fit;
        self
    }
}

/// Residuals of the first-pass negative binomial fit.
#[derive(Debug, Clone)]
pub struct ResidualFit {
    /// Deviance residuals, genes x samples.
    pub residuals: Array2<f64>,
    /// The dispersion the genes were fit with.
    pub dispersion: f64,
    pub fits: GeneFits,
}

/// Fit a negative binomial GLM of each gene on the design `x` (samples x p,
/// including the intercept) with normalization offsets and a common
/// dispersion, and return the deviance residuals.
pub fn deviance_residuals(
    counts: &CountMatrix,
    x: ArrayView2<f64>,
    options: &ResidualOptions,
) -> RuvResult<ResidualFit> {
    if counts.is_log_scale() {
        return Err(RuvError::InvalidCounts(
            "a count model cannot be fit to log-scale values".to_string(),
        ));
    }
    let offsets = glm_offsets(counts.counts(), options.normalization)?;
    let dispersion = match options.dispersion {
        Some(dispersion) => dispersion,
        None => estimate_common_dispersion(counts.counts(), x, Some(offsets.view()))?,
    };
    let family = NegativeBinomial::new(dispersion)?;
    let fits = fit_genes(counts.counts(), x, Some(offsets.view()), &family, &options.fit)?;
    log::info!(
        "First-pass fit of {} genes with dispersion {:.4}",
        counts.n_genes(),
        dispersion
    );
    Ok(ResidualFit {
        residuals: fits.deviance_residuals.clone(),
        dispersion,
        fits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::group_design;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn batch_counts() -> RuvResult<CountMatrix> {
        // conditions alternate a/b, batches are samples 0-3 and 4-7; gene 4
        // responds to the condition
        let counts = array![
            [100, 104, 98, 101, 160, 165, 158, 162],
            [50, 52, 49, 51, 82, 80, 84, 79],
            [200, 195, 205, 199, 330, 322, 318, 325],
            [70, 72, 69, 71, 110, 116, 113, 111],
            [40, 120, 42, 118, 65, 190, 62, 195]
        ];
        CountMatrix::from_integers(counts)
    }

    #[test]
    fn residual_factor_tracks_batch() -> RuvResult<()> {
        let counts = batch_counts()?;
        let (x, _) = group_design(&["a", "b", "a", "b", "a", "b", "a", "b"])?;
        let opts = ResidualOptions::default()
            .normalization(NormalizationMethod::None)
            .dispersion(0.01);
        let first_pass = deviance_residuals(&counts, x.view(), &opts)?;
        assert_eq!(first_pass.residuals.dim(), (5, 8));
        assert_eq!(first_pass.dispersion, 0.01);
        let fit = ruv_r(&counts, &[0, 1, 2, 3], first_pass.residuals.view(), &RuvOptions::new(1))?;
        let w = fit.w.column(0);
        let first = w.iter().take(4).sum::<f64>();
        let second = w.iter().skip(4).sum::<f64>();
        assert!(first * second < 0.);
        assert!(w.iter().take(4).all(|&v| v * first > 0.));
        assert_abs_diff_eq!(w.sum(), 0., epsilon = 1e-8);
        Ok(())
    }

    #[test]
    fn dropped_factor_is_the_next_singular_vector() -> RuvResult<()> {
        let counts = batch_counts()?;
        let (x, _) = group_design(&["a", "b", "a", "b", "a", "b", "a", "b"])?;
        let opts = ResidualOptions::default().dispersion(0.01);
        let residuals = deviance_residuals(&counts, x.view(), &opts)?.residuals;
        let controls = [0, 1, 2, 3];
        let both = ruv_r(&counts, &controls, residuals.view(), &RuvOptions::new(2))?;
        let dropped = ruv_r(&counts, &controls, residuals.view(), &RuvOptions::new(2).drop(1))?;
        assert_eq!(dropped.k, 1);
        assert_eq!(dropped.w.ncols(), 1);
        assert_abs_diff_eq!(
            dropped.w.column(0).mapv(f64::abs),
            both.w.column(1).mapv(f64::abs),
            epsilon = 1e-10
        );
        assert!(ruv_r(&counts, &controls, residuals.view(), &RuvOptions::new(2).drop(2)).is_err());
        Ok(())
    }

    #[test]
    fn log_scale_input_is_corrected_on_the_log_scale() -> RuvResult<()> {
        let counts = batch_counts()?;
        let (x, _) = group_design(&["a", "b", "a", "b", "a", "b", "a", "b"])?;
        let residuals = deviance_residuals(&counts, x.view(), &ResidualOptions::default().dispersion(0.01))?
            .residuals;
        let log_values = CountMatrix::from_log_values(
            counts.counts().mapv(|c| (c + 1.).ln()),
            counts.gene_ids().to_vec(),
            counts.sample_ids().to_vec(),
        )?;
        // the count model itself needs counts
        assert!(deviance_residuals(&log_values, x.view(), &ResidualOptions::default()).is_err());

        let controls = [0, 1, 2, 3];
        let on_counts = ruv_r(&counts, &controls, residuals.view(), &RuvOptions::new(1).round(false))?;
        let on_logs = ruv_r(
            &log_values,
            &controls,
            residuals.view(),
            &RuvOptions::new(1).is_log(true).round(false),
        )?;
        assert_abs_diff_eq!(on_logs.w, on_counts.w, epsilon = 1e-12);
        assert_abs_diff_eq!(
            on_logs.normalized,
            on_counts.normalized.mapv(|v| (v + 1.).ln()),
            epsilon = 1e-8
        );
        Ok(())
    }

    #[test]
    fn residual_shape_checked() -> RuvResult<()> {
        let counts = batch_counts()?;
        let residuals = Array2::zeros((8, 5));
        assert!(matches!(
            ruv_r(&counts, &[0], residuals.view(), &RuvOptions::new(1)),
            Err(RuvError::BadInput(_))
        ));
        Ok(())
    }

    #[test]
    fn dispersion_estimated_when_missing() -> RuvResult<()> {
        let counts = batch_counts()?;
        let (x, _) = group_design(&["a", "b", "a", "b", "a", "b", "a", "b"])?;
        let first_pass = deviance_residuals(&counts, x.view(), &ResidualOptions::default())?;
        assert!(first_pass.dispersion >= 0.);
        assert!(first_pass.residuals.iter().all(|r| r.is_finite()));
        Ok(())
    }
}
