//! Differential expression tests around the factor estimation: the
//! first-pass test that ranks genes for empirical controls, and the design
//! for the final fit with the factors as covariates.

use crate::{
    error::{RuvError, RuvResult},
    fit::options::FitOptions,
    genewise::fit_genes,
    glm::Glm,
};
use itertools::Itertools;
use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::cmp::Ordering;

/// Per-gene likelihood ratio test of a full design against a nested one.
#[derive(Debug, Clone, Serialize)]
pub struct LrTest {
    /// 2 * (l_full - l_reduced) for each gene
    pub statistic: Vec<f64>,
    pub p_values: Vec<f64>,
    /// Benjamini-Hochberg adjusted p-values
    pub adjusted: Vec<f64>,
    /// The difference in the number of parameters.
    pub df: usize,
}

/// Test every gene of `counts` (genes x samples) for the columns of `full`
/// that are not in `reduced`. Both designs include their intercepts. The
/// statistic is asymptotically chi-squared with the difference in the number
/// of columns as degrees of freedom.
pub fn lr_test<M>(
    counts: ArrayView2<f64>,
    full: ArrayView2<f64>,
    reduced: ArrayView2<f64>,
    offsets: Option<ArrayView2<f64>>,
    family: &M,
    options: &FitOptions<f64>,
) -> RuvResult<LrTest>
where
    M: Glm<f64> + Clone,
{
    if full.ncols() <= reduced.ncols() {
        return Err(RuvError::BadInput(format!(
            "the full design ({} columns) must have more columns than the reduced one ({})",
            full.ncols(),
            reduced.ncols()
        )));
    }
    let df = full.ncols() - reduced.ncols();
    let full_fits = fit_genes(counts, full, offsets, family, options)?;
    let reduced_fits = fit_genes(counts, reduced, offsets, family, options)?;

    let statistic = lr_statistics(full_fits.log_like.view(), reduced_fits.log_like.view());
    let p_values = chi_squared_p_values(statistic.view(), df)?;
    let adjusted = benjamini_hochberg(&p_values);
    log::info!(
        "LR test on {} df: {} genes with adjusted p < 0.05",
        df,
        adjusted.iter().filter(|&&p| p < 0.05).count()
    );
    Ok(LrTest {
        statistic: statistic.to_vec(),
        p_values,
        adjusted,
        df,
    })
}

/// 2 * (l_full - l_reduced), clipped at zero. A gene whose fit failed has a
/// NaN likelihood and keeps a NaN statistic.
fn lr_statistics(full: ArrayView1<f64>, reduced: ArrayView1<f64>) -> Array1<f64> {
    Zip::from(&full).and(&reduced).map_collect(|&l_full, &l_red| {
        let stat = 2. * (l_full - l_red);
        if stat.is_nan() {
            f64::NAN
        } else {
            stat.max(0.)
        }
    })
}

/// Upper tail probabilities of the chi-squared distribution; NaN in, NaN out.
fn chi_squared_p_values(statistic: ArrayView1<f64>, df: usize) -> RuvResult<Vec<f64>> {
    let chi2 = ChiSquared::new(df as f64)
        .map_err(|e| RuvError::BadInput(format!("chi-squared with {} df: {}", df, e)))?;
    Ok(statistic
        .iter()
        .map(|&s| if s.is_nan() { f64::NAN } else { chi2.sf(s) })
        .collect())
}

/// Order p-values ascending with NaN last.
fn p_value_order(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

/// Benjamini-Hochberg adjustment, as R's `p.adjust(method = "BH")`. NaN
/// p-values are not counted as tests and stay NaN.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let n_tests = p_values.iter().filter(|p| !p.is_nan()).count();
    let mut adjusted = vec![f64::NAN; p_values.len()];
    let ranked = (0..p_values.len())
        .filter(|&i| !p_values[i].is_nan())
        .sorted_by(|&a, &b| p_value_order(p_values[a], p_values[b]))
        .collect_vec();
    let mut running_min = 1f64;
    for (rank, &i) in ranked.iter().enumerate().rev() {
        let adj = p_values[i] * n_tests as f64 / (rank + 1) as f64;
        running_min = running_min.min(adj);
        adjusted[i] = running_min;
    }
    adjusted
}

/// Empirical negative controls: every gene except the `n_top_excluded` with
/// the smallest p-values, as sorted gene indices. Genes without a p-value
/// rank last and so are kept as controls.
pub fn empirical_controls(p_values: &[f64], n_top_excluded: usize) -> Vec<usize> {
    if n_top_excluded >= p_values.len() {
        log::warn!(
            "Excluding the top {} of {} genes leaves no empirical controls",
            n_top_excluded,
            p_values.len()
        );
    }
    (0..p_values.len())
        .sorted_by(|&a, &b| p_value_order(p_values[a], p_values[b]).then(a.cmp(&b)))
        .skip(n_top_excluded)
        .sorted()
        .collect()
}

/// The design [X | W] for the final fit with the unwanted factors as
/// covariates.
pub fn augment_design(x: ArrayView2<f64>, w: ArrayView2<f64>) -> RuvResult<Array2<f64>> {
    if x.nrows() != w.nrows() {
        return Err(RuvError::BadInput(format!(
            "design has {} rows but W has {}",
            x.nrows(),
            w.nrows()
        )));
    }
    Ok(concatenate(Axis(1), &[x.view(), w.view()])?)
}
