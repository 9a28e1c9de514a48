//! Design matrices for a single categorical covariate of interest.

use crate::error::{RuvError, RuvResult};
use ndarray::Array2;
use std::collections::BTreeSet;

/// The distinct levels of a factor, sorted. The first level is the reference.
pub fn levels<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    labels
        .iter()
        .map(|l| l.as_ref().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// An intercept column followed by one treatment-contrast indicator column
/// per non-reference level, as `model.matrix(~group)` builds it. Also returns
/// the coefficient names.
pub fn group_design<S: AsRef<str>>(labels: &[S]) -> RuvResult<(Array2<f64>, Vec<String>)> {
    if labels.is_empty() {
        return Err(RuvError::BadInput("no sample labels given".to_string()));
    }
    let levels = levels(labels);
    if levels.len() < 2 {
        log::warn!("Only one group level '{}'; the design is intercept only", levels[0]);
    }
    let mut design = Array2::zeros((labels.len(), levels.len()));
    design.column_mut(0).fill(1.);
    for (i, label) in labels.iter().enumerate() {
        if let Some(col) = levels.iter().skip(1).position(|l| l == label.as_ref()) {
            design[[i, col + 1]] = 1.;
        }
    }
    let names = std::iter::once("intercept".to_string())
        .chain(levels.iter().skip(1).map(|l| format!("group_{}", l)))
        .collect();
    Ok((design, names))
}

/// The sample indices belonging to each level, in level order.
pub fn group_indices<S: AsRef<str>>(labels: &[S]) -> Vec<Vec<usize>> {
    levels(labels)
        .iter()
        .map(|level| {
            labels
                .iter()
                .enumerate()
                .filter(|(_, l)| l.as_ref() == level)
                .map(|(i, _)| i)
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn treatment_contrasts() -> RuvResult<()> {
        let labels = ["trt", "ctl", "trt", "mock", "ctl"];
        let (x, names) = group_design(&labels)?;
        assert_eq!(names, vec!["intercept", "group_mock", "group_trt"]);
        assert_eq!(
            x,
            array![
                [1., 0., 1.],
                [1., 0., 0.],
                [1., 0., 1.],
                [1., 1., 0.],
                [1., 0., 0.]
            ]
        );
        assert_eq!(group_indices(&labels), vec![vec![1, 4], vec![3], vec![0, 2]]);
        Ok(())
    }

    #[test]
    fn empty_labels_rejected() {
        let labels: [&str; 0] = [];
        assert!(group_design(&labels).is_err());
    }
}
