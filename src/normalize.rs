//! Between-sample normalization of a genes x samples count matrix, and the
//! log offsets that carry a normalization into a count GLM.

use crate::{
    error::{RuvError, RuvResult},
    math::quantile,
};
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use std::{fmt, str::FromStr};

/// The between-sample normalization to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizationMethod {
    /// Leave the counts as they are.
    None,
    /// Scale each sample by its median count.
    Median,
    /// Scale each sample by its upper-quartile count.
    #[default]
    Upper,
    /// Full-quantile normalization: every sample gets the same distribution.
    Full,
}

impl NormalizationMethod {
    /// The per-sample quantile the scaling methods match across samples.
    fn probability(self) -> Option<f64> {
        match self {
            Self::Median => Some(0.5),
            Self::Upper => Some(0.75),
            Self::None | Self::Full => None,
        }
    }
}

impl FromStr for NormalizationMethod {
    type Err = RuvError;

    fn from_str(s: &str) -> RuvResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "median" => Ok(Self::Median),
            "upper" => Ok(Self::Upper),
            "full" => Ok(Self::Full),
            other => Err(RuvError::BadInput(format!(
                "unknown normalization method '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for NormalizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Median => "median",
            Self::Upper => "upper",
            Self::Full => "full",
        };
        f.write_str(name)
    }
}

/// The scale factor of each sample: its median or upper quartile divided by
/// the mean of those quantiles over all samples. Dividing a sample's counts
/// by its factor equalizes the quantiles. `None` and `Full` give unit
/// factors.
pub fn scale_factors(counts: ArrayView2<f64>, method: NormalizationMethod) -> RuvResult<Array1<f64>> {
    let n_samples = counts.ncols();
    let prob = match method.probability() {
        Some(prob) => prob,
        None => return Ok(Array1::ones(n_samples)),
    };
    let quantiles: Array1<f64> = counts
        .axis_iter(Axis(1))
        .map(|col| {
            let values: Vec<f64> = col.to_vec();
            quantile(&values, prob).ok_or_else(|| {
                RuvError::InvalidCounts("cannot normalize a matrix with no genes".to_string())
            })
        })
        .collect::<RuvResult<_>>()?;
    if let Some(j) = quantiles.iter().position(|&q| q <= 0.) {
        return Err(RuvError::InvalidCounts(format!(
            "the {} quantile of sample {} is zero; filter out lowly expressed genes first",
            method, j
        )));
    }
    let mean = quantiles.mean().ok_or_else(|| {
        RuvError::InvalidCounts("cannot normalize a matrix with no samples".to_string())
    })?;
    log::debug!("{} quantiles: {}", method, quantiles);
    Ok(quantiles / mean)
}

/// Normalize the counts (genes x samples) between samples, optionally
/// rounding the result back to whole numbers.
pub fn between_sample(
    counts: ArrayView2<f64>,
    method: NormalizationMethod,
    round: bool,
) -> RuvResult<Array2<f64>> {
    let normalized = match method {
        NormalizationMethod::None => counts.to_owned(),
        NormalizationMethod::Median | NormalizationMethod::Upper => {
            let factors = scale_factors(counts, method)?;
            &counts / &factors
        }
        NormalizationMethod::Full => full_quantile(counts),
    };
    Ok(if round {
        normalized.mapv_into(f64::round)
    } else {
        normalized
    })
}

/// Replace each value by the mean, over samples, of the values with the same
/// rank. Tied values share the average of the reference values over their
/// ranks.
fn full_quantile(counts: ArrayView2<f64>) -> Array2<f64> {
    let (n_genes, n_samples) = counts.dim();
    if n_genes == 0 || n_samples == 0 {
        return counts.to_owned();
    }
    let orders: Vec<Vec<usize>> = counts
        .axis_iter(Axis(1))
        .map(|col| {
            let mut order: Vec<usize> = (0..n_genes).collect();
            order.sort_by(|&a, &b| col[a].total_cmp(&col[b]));
            order
        })
        .collect();

    let mut reference: Array1<f64> = Array1::zeros(n_genes);
    for (col, order) in counts.axis_iter(Axis(1)).zip(&orders) {
        for (rank, &gene) in order.iter().enumerate() {
            reference[rank] += col[gene];
        }
    }
    reference /= n_samples as f64;

    let mut normalized: Array2<f64> = Array2::zeros((n_genes, n_samples));
    for (j, order) in orders.iter().enumerate() {
        let col = counts.column(j);
        let mut start = 0;
        while start < n_genes {
            let value = col[order[start]];
            let mut end = start + 1;
            while end < n_genes && col[order[end]] == value {
                end += 1;
            }
            let level = reference.slice(ndarray::s![start..end]).mean().unwrap_or(value);
            for &gene in &order[start..end] {
                normalized[[gene, j]] = level;
            }
            start = end;
        }
    }
    normalized
}

/// The offsets log(normalized + 1) - log(raw + 1) that reproduce a
/// normalization inside a log-link GLM fit to the raw counts. Both matrices
/// are genes x samples.
pub fn log_offsets(raw: ArrayView2<f64>, normalized: ArrayView2<f64>) -> RuvResult<Array2<f64>> {
    if raw.dim() != normalized.dim() {
        return Err(RuvError::BadInput(format!(
            "raw counts are {:?} but normalized counts are {:?}",
            raw.dim(),
            normalized.dim()
        )));
    }
    Ok(Zip::from(&raw)
        .and(&normalized)
        .map_collect(|&r, &n| (n + 1.).ln() - (r + 1.).ln()))
}

/// Offsets for a log-link GLM of the raw counts (genes x samples) that
/// account for a normalization. The scaling methods give the log scale
/// factor of each sample; full-quantile normalization gives per-count
/// offsets log(raw + 1) - log(normalized + 1).
pub fn glm_offsets(counts: ArrayView2<f64>, method: NormalizationMethod) -> RuvResult<Array2<f64>> {
    match method {
        NormalizationMethod::None => Ok(Array2::zeros(counts.dim())),
        NormalizationMethod::Median | NormalizationMethod::Upper => {
            let log_factors = scale_factors(counts, method)?.mapv_into(f64::ln);
            Ok(Array2::from_shape_fn(counts.dim(), |(_, j)| log_factors[j]))
        }
        NormalizationMethod::Full => {
            let normalized = between_sample(counts, method, false)?;
            Ok(-log_offsets(counts, normalized.view())?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn upper_quartile_equalizes_samples() -> RuvResult<()> {
        // the second sample is the first at twice the depth
        let counts = array![[1., 2.], [4., 8.], [10., 20.], [30., 60.], [100., 200.]];
        let factors = scale_factors(counts.view(), NormalizationMethod::Upper)?;
        assert_abs_diff_eq!(factors, array![2. / 3., 4. / 3.], epsilon = 1e-12);
        let normalized = between_sample(counts.view(), NormalizationMethod::Upper, false)?;
        assert_abs_diff_eq!(normalized.column(0), normalized.column(1), epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn zero_quantile_rejected() {
        let counts = array![[0., 5.], [0., 3.], [0., 0.], [1., 9.]];
        assert!(matches!(
            scale_factors(counts.view(), NormalizationMethod::Median),
            Err(RuvError::InvalidCounts(_))
        ));
    }

    #[test]
    fn full_quantile_shares_distribution() -> RuvResult<()> {
        let counts = array![[5., 4.], [2., 1.], [3., 4.], [4., 2.]];
        let normalized = between_sample(counts.view(), NormalizationMethod::Full, false)?;
        // sorted columns are [2, 3, 4, 5] and [1, 2, 4, 4]: the reference is
        // [1.5, 2.5, 4, 4.5], and the tied pair in the second sample shares
        // the mean of the top two levels
        assert_abs_diff_eq!(normalized.column(0), array![4.5, 1.5, 2.5, 4.], epsilon = 1e-12);
        assert_abs_diff_eq!(normalized.column(1), array![4.25, 1.5, 4.25, 2.5], epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn offsets_vanish_without_normalization() -> RuvResult<()> {
        let counts = array![[1., 2.], [3., 0.]];
        let normalized = between_sample(counts.view(), NormalizationMethod::None, true)?;
        let offsets = log_offsets(counts.view(), normalized.view())?;
        assert_abs_diff_eq!(offsets, Array2::<f64>::zeros((2, 2)));
        Ok(())
    }

    #[test]
    fn glm_offsets_follow_depth() -> RuvResult<()> {
        let counts = array![[1., 2.], [4., 8.], [10., 20.], [30., 60.], [100., 200.]];
        let offsets = glm_offsets(counts.view(), NormalizationMethod::Upper)?;
        assert_abs_diff_eq!(offsets[[0, 1]] - offsets[[0, 0]], 2f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(offsets.row(3), offsets.row(0));
        Ok(())
    }

    #[test]
    fn method_names_parse() -> RuvResult<()> {
        assert!("UQ".parse::<NormalizationMethod>().is_err());
        assert_eq!("Upper".parse::<NormalizationMethod>()?, NormalizationMethod::Upper);
        assert_eq!(NormalizationMethod::Full.to_string(), "full");
        Ok(())
    }
}
