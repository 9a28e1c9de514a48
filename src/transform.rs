//! Element-wise transforms between the count and log scales

use ndarray::{Array2, ArrayView2, Axis};

/// log(x + epsilon), element-wise.
pub fn log_transform(x: ArrayView2<f64>, epsilon: f64) -> Array2<f64> {
    x.mapv(|v| (v + epsilon).ln())
}

/// Subtract the mean of each column from that column. Matrices without rows
/// are returned unchanged.
pub fn center_columns(m: ArrayView2<f64>) -> Array2<f64> {
    match m.mean_axis(Axis(0)) {
        Some(means) => &m - &means,
        None => m.to_owned(),
    }
}

/// The inverse of `log_transform`, exp(y) - epsilon. With `round` the values
/// are rounded to whole counts and negative values are clipped to zero.
pub fn back_transform(y: ArrayView2<f64>, epsilon: f64, round: bool) -> Array2<f64> {
    if round {
        y.mapv(|v| (v.exp() - epsilon).round().max(0.))
    } else {
        y.mapv(|v| v.exp() - epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn centered_columns_have_zero_mean() {
        let m = array![[1., 10.], [2., 20.], [6., 0.]];
        let c = center_columns(m.view());
        assert_abs_diff_eq!(c, array![[-2., 0.], [-1., 10.], [3., -10.]]);
    }

    #[test]
    fn back_transform_inverts_log() {
        let counts = array![[0., 4.], [17., 250.]];
        let y = log_transform(counts.view(), 1.);
        assert_abs_diff_eq!(back_transform(y.view(), 1., false), counts, epsilon = 1e-9);
        assert_eq!(back_transform(y.view(), 1., true), counts);
    }

    #[test]
    fn rounding_clips_negatives() {
        let y = array![[(0.2f64).ln(), (3.6f64).ln()]];
        assert_eq!(back_transform(y.view(), 1., true), array![[0., 3.]]);
    }
}
