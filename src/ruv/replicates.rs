//! RUVs: factors from replicate samples

use super::{corrected_counts, RuvFit, RuvOptions};
use crate::{
    counts::CountMatrix,
    error::{RuvError, RuvResult},
    factor::scaled_right_singular_vectors,
    utility::select_columns,
};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_linalg::InverseH;
use std::collections::BTreeMap;

/// Sets of samples for which the covariates of interest are constant, such
/// as technical replicates or replicate libraries of a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicateGroups {
    groups: Vec<Vec<usize>>,
}

impl ReplicateGroups {
    /// Group sample indices directly.
    pub fn new(groups: Vec<Vec<usize>>) -> Self {
        Self { groups }
    }

    /// One group per distinct label, in sorted label order, holding the
    /// indices of the samples with that label.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut by_label: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, label) in labels.iter().enumerate() {
            by_label.entry(label.as_ref()).or_default().push(i);
        }
        Self {
            groups: by_label.into_values().collect(),
        }
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    /// The groups with at least two samples; only these carry information
    /// about the unwanted variation.
    pub fn replicated(&self) -> impl Iterator<Item = &Vec<usize>> {
        self.groups.iter().filter(|g| g.len() >= 2)
    }
}

/// The deviation of each replicated sample from the mean of its group, one
/// row per sample. Rows that are identically zero carry no information and
/// are left out.
fn replicate_differences(y: &Array2<f64>, groups: &ReplicateGroups) -> RuvResult<Array2<f64>> {
    let n_samples = y.nrows();
    let mut rows: Vec<Array1<f64>> = Vec::new();
    for group in groups.replicated() {
        if let Some(&index) = group.iter().find(|&&s| s >= n_samples) {
            return Err(RuvError::OutOfRange {
                index,
                len: n_samples,
                what: "samples",
            });
        }
        let members = y.select(Axis(0), group);
        let mean = members
            .mean_axis(Axis(0))
            .ok_or(RuvError::NoControls("samples"))?;
        for row in members.axis_iter(Axis(0)) {
            let diff = &row - &mean;
            if diff.iter().any(|&d| d != 0.) {
                rows.push(diff);
            }
        }
    }
    if rows.is_empty() {
        return Err(RuvError::NoControls("replicate samples"));
    }
    let views: Vec<ArrayView1<f64>> = rows.iter().map(|r| r.view()).collect();
    Ok(ndarray::stack(Axis(0), &views)?)
}

/// Estimate W from the differences between replicate samples. The leading
/// right singular vectors of the stacked replicate differences, scaled by
/// their singular values, give the gene loadings `alpha`; W is the
/// least-squares fit of the control-gene log counts on those loadings.
///
/// The `drop` and `center` options do not apply here.
pub fn ruv_s(
    counts: &CountMatrix,
    control_genes: &[usize],
    groups: &ReplicateGroups,
    options: &RuvOptions,
) -> RuvResult<RuvFit> {
    if control_genes.is_empty() {
        return Err(RuvError::NoControls("genes"));
    }
    let n_replicated = groups.replicated().count();
    if n_replicated < groups.groups().len() {
        log::warn!(
            "{} replicate group(s) with a single sample are ignored",
            groups.groups().len() - n_replicated
        );
    }
    if n_replicated == 0 {
        return Err(RuvError::NoControls("replicate samples"));
    }
    let y: Array2<f64> = counts.log_samples_by_genes(options.epsilon, options.is_log);
    let y_controls = select_columns(y.view(), control_genes, "genes")?;

    let differences = replicate_differences(&y, groups)?;
    let svd = scaled_right_singular_vectors(differences.view(), options.k, options.tolerance)?;
    let alpha = svd.vectors;
    let k = svd.k;
    if control_genes.len() < k {
        return Err(RuvError::BadInput(format!(
            "{} control genes cannot determine {} factors",
            control_genes.len(),
            k
        )));
    }

    // W = Y_c ((a_c a_c')^-1 a_c)' = Y_c a_c' (a_c a_c')^-1
    let alpha_controls = select_columns(alpha.view(), control_genes, "genes")?;
    let gram_inv: Array2<f64> = alpha_controls.dot(&alpha_controls.t()).invh()?;
    let w: Array2<f64> = y_controls.dot(&alpha_controls.t()).dot(&gram_inv);
    let corrected = &y - &w.dot(&alpha);
    log::info!(
        "RUVs: {} factor(s) from {} replicate differences over {} control genes",
        k,
        differences.nrows(),
        control_genes.len()
    );
    Ok(RuvFit {
        normalized: corrected_counts(corrected.view(), counts, options),
        w,
        alpha,
        k,
        singular_values: svd.singular_values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn groups_follow_sorted_labels() {
        let groups = ReplicateGroups::from_labels(&["b", "a", "b", "c", "a", "b"]);
        assert_eq!(groups.groups(), &[vec![1, 4], vec![0, 2, 5], vec![3]]);
        assert_eq!(groups.replicated().count(), 2);
    }

    #[test]
    fn differences_drop_constant_rows() -> RuvResult<()> {
        let y = array![[1., 2.], [3., 2.], [5., 5.], [5., 5.], [0., 1.]];
        let groups = ReplicateGroups::new(vec![vec![0, 1], vec![2, 3], vec![4]]);
        let diffs = replicate_differences(&y, &groups)?;
        assert_eq!(diffs, array![[-1., 0.], [1., 0.]]);
        Ok(())
    }

    #[test]
    fn single_sample_groups_rejected() -> RuvResult<()> {
        let counts = CountMatrix::from_integers(array![[1, 2, 3], [4, 5, 6]])?;
        let groups = ReplicateGroups::from_labels(&["x", "y", "z"]);
        assert!(matches!(
            ruv_s(&counts, &[0, 1], &groups, &RuvOptions::new(1)),
            Err(RuvError::NoControls(_))
        ));
        Ok(())
    }

    fn batch_replicates() -> RuvResult<CountMatrix> {
        // two conditions with three replicates each; the third replicate of
        // each condition was sequenced in a second batch that inflates every
        // gene by the same factor
        let counts = array![
            [100, 102, 200, 50, 51, 100],
            [80, 79, 161, 400, 404, 810],
            [60, 61, 119, 30, 29, 61],
            [250, 248, 502, 260, 255, 515],
            [40, 41, 79, 45, 44, 91]
        ];
        CountMatrix::from_integers(counts)
    }

    #[test]
    fn replicate_index_out_of_range() -> RuvResult<()> {
        let counts = batch_replicates()?;
        let groups = ReplicateGroups::new(vec![vec![0, 1], vec![3, 7]]);
        assert!(matches!(
            ruv_s(&counts, &[0, 1, 2], &groups, &RuvOptions::new(1)),
            Err(RuvError::OutOfRange { index: 7, len: 6, .. })
        ));
        Ok(())
    }

    #[test]
    fn too_few_controls_for_k() -> RuvResult<()> {
        let counts = batch_replicates()?;
        let groups = ReplicateGroups::from_labels(&["a", "a", "a", "b", "b", "b"]);
        assert!(matches!(
            ruv_s(&counts, &[0], &groups, &RuvOptions::new(2)),
            Err(RuvError::BadInput(_))
        ));
        Ok(())
    }

    #[test]
    fn log_scale_values_stay_on_the_log_scale() -> RuvResult<()> {
        let counts = batch_replicates()?;
        let groups = ReplicateGroups::from_labels(&["a", "a", "a", "b", "b", "b"]);
        // log2 of counts per thousand: mostly negative
        let log_values = CountMatrix::from_log_values(
            counts.counts().mapv(|c| (c / 1000.).log2()),
            counts.gene_ids().to_vec(),
            counts.sample_ids().to_vec(),
        )?;
        let controls = [0, 1, 2, 3, 4];
        let fit = ruv_s(&log_values, &controls, &groups, &RuvOptions::new(1).is_log(true).round(false))?;
        assert_eq!(fit.w.dim(), (6, 1));
        assert!(fit.normalized.iter().any(|&v| v < 0.));
        // the batch is removed from the log values
        for gene in fit.normalized.axis_iter(Axis(0)) {
            assert_abs_diff_eq!(gene[2], gene[0], epsilon = 0.15);
            assert_abs_diff_eq!(gene[5], gene[3], epsilon = 0.15);
        }
        Ok(())
    }

    #[test]
    fn replicate_noise_is_removed() -> RuvResult<()> {
        let counts = batch_replicates()?;
        let groups = ReplicateGroups::from_labels(&["a", "a", "a", "b", "b", "b"]);
        let fit = ruv_s(&counts, &[0, 1, 2, 3, 4], &groups, &RuvOptions::new(1).round(false))?;
        assert_eq!(fit.w.dim(), (6, 1));
        assert_eq!(fit.alpha.dim(), (1, 5));
        // the batch factor singles out samples 2 and 5
        let w = fit.w.column(0);
        assert!((w[2] - w[0]).abs() > 5. * (w[1] - w[0]).abs());
        assert!((w[5] - w[3]).abs() > 5. * (w[4] - w[3]).abs());
        // within a condition the corrected replicates now agree
        let log_norm = fit.normalized.mapv(|v| (v + 1.).ln());
        for gene in log_norm.axis_iter(Axis(0)) {
            assert_abs_diff_eq!(gene[2], gene[0], epsilon = 0.1);
            assert_abs_diff_eq!(gene[5], gene[3], epsilon = 0.1);
        }
        Ok(())
    }
}
