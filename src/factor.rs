//! The linear algebra shared by the factor estimators: a truncated SVD of a
//! samples x features matrix and the least-squares removal of the factors.

use crate::error::{RuvError, RuvResult};
use ndarray::{s, Array1, Array2, ArrayView2};
use ndarray_linalg::{InverseH, SVD};

/// The leading left singular vectors of a matrix together with its full
/// singular value spectrum.
#[derive(Debug, Clone)]
pub struct FactorSvd {
    /// Columns `drop..k` of U, one row per sample.
    pub vectors: Array2<f64>,
    /// All singular values, in decreasing order.
    pub singular_values: Array1<f64>,
    /// The number of factors after capping at the numerical rank, including
    /// the dropped ones.
    pub k: usize,
}

/// The number of factors that can be extracted: `k` capped at the number of
/// singular values above `tolerance`.
fn effective_k(singular_values: &Array1<f64>, k: usize, tolerance: f64) -> RuvResult<usize> {
    let rank = singular_values.iter().filter(|&&d| d > tolerance).count();
    if rank == 0 {
        return Err(RuvError::RankDeficient(tolerance));
    }
    if k > rank {
        log::warn!(
            "Only {} singular values exceed the tolerance {:e}; using k = {} instead of {}",
            rank,
            tolerance,
            rank,
            k
        );
        return Ok(rank);
    }
    Ok(k)
}

fn check_k(k: usize) -> RuvResult<()> {
    if k == 0 {
        return Err(RuvError::BadInput(
            "the number of factors k must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Compute the SVD of `m` (samples x features) and return the left singular
/// vectors `drop..k`, where `k` is first capped at the rank implied by
/// `tolerance`.
pub fn left_singular_vectors(
    m: ArrayView2<f64>,
    k: usize,
    drop: usize,
    tolerance: f64,
) -> RuvResult<FactorSvd> {
    check_k(k)?;
    if drop >= k {
        return Err(RuvError::DropTooLarge { drop, k });
    }
    if m.ncols() == 0 || m.nrows() == 0 {
        return Err(RuvError::BadInput(
            "cannot factor a matrix with no rows or columns".to_string(),
        ));
    }
    let (u, singular_values, _) = m.svd(true, false)?;
    let u = u.ok_or(RuvError::Decomposition("left singular vectors"))?;
    let k = effective_k(&singular_values, k, tolerance)?;
    if drop >= k {
        return Err(RuvError::DropTooLarge { drop, k });
    }
    log::debug!("Leading singular values: {}", singular_values.slice(s![..k]));
    Ok(FactorSvd {
        vectors: u.slice(s![.., drop..k]).to_owned(),
        singular_values,
        k,
    })
}

/// The leading right singular vectors scaled by their singular values,
/// diag(d_1..k) V_1..k', for a matrix `m` with few rows and many columns.
/// Only U is decomposed; the scaled vectors are U_k' m, which avoids forming
/// V for every column.
pub fn scaled_right_singular_vectors(
    m: ArrayView2<f64>,
    k: usize,
    tolerance: f64,
) -> RuvResult<FactorSvd> {
    check_k(k)?;
    if m.ncols() == 0 || m.nrows() == 0 {
        return Err(RuvError::BadInput(
            "cannot factor a matrix with no rows or columns".to_string(),
        ));
    }
    let (u, singular_values, _) = m.svd(true, false)?;
    let u = u.ok_or(RuvError::Decomposition("left singular vectors"))?;
    let k = effective_k(&singular_values, k, tolerance)?;
    let vectors = u.slice(s![.., ..k]).t().dot(&m);
    Ok(FactorSvd {
        vectors,
        singular_values,
        k,
    })
}

/// Regress each column of `y` (samples x genes) on the factors `w`
/// (samples x k). Returns the coefficients alpha = (W'W)^-1 W'Y, k x genes,
/// and the residual Y - W alpha.
pub fn regress_out(y: ArrayView2<f64>, w: ArrayView2<f64>) -> RuvResult<(Array2<f64>, Array2<f64>)> {
    if y.nrows() != w.nrows() {
        return Err(RuvError::BadInput(format!(
            "{} samples in the data but {} in the factors",
            y.nrows(),
            w.nrows()
        )));
    }
    let wtw_inv: Array2<f64> = w.t().dot(&w).invh()?;
    let alpha: Array2<f64> = wtw_inv.dot(&w.t().dot(&y));
    let corrected = &y - &w.dot(&alpha);
    Ok((alpha, corrected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Axis};

    #[test]
    fn rank_one_matrix_caps_k() -> RuvResult<()> {
        // an outer product has a single non-zero singular value
        let m = array![[1.], [2.], [-3.]].dot(&array![[1., 0.5, 2., -1.]]);
        let svd = left_singular_vectors(m.view(), 3, 0, 1e-8)?;
        assert_eq!(svd.k, 1);
        assert_eq!(svd.vectors.dim(), (3, 1));
        let norm = svd.vectors.column(0).dot(&svd.vectors.column(0));
        assert_abs_diff_eq!(norm, 1., epsilon = 1e-12);
        assert_abs_diff_eq!(svd.vectors[[1, 0]] / svd.vectors[[0, 0]], 2., epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn drop_must_leave_a_factor() {
        let m = array![[1., 0.], [0., 2.], [1., 1.]];
        assert!(matches!(
            left_singular_vectors(m.view(), 2, 2, 1e-8),
            Err(RuvError::DropTooLarge { drop: 2, k: 2 })
        ));
        // capping k at the rank can also exhaust the factors
        let rank_one = array![[1., 2.], [2., 4.], [3., 6.]];
        assert!(matches!(
            left_singular_vectors(rank_one.view(), 2, 1, 1e-8),
            Err(RuvError::DropTooLarge { drop: 1, k: 1 })
        ));
    }

    #[test]
    fn zero_matrix_is_rank_deficient() {
        let m: Array2<f64> = Array2::zeros((4, 3));
        assert!(matches!(
            left_singular_vectors(m.view(), 1, 0, 1e-8),
            Err(RuvError::RankDeficient(_))
        ));
    }

    #[test]
    fn scaled_vectors_reconstruct() -> RuvResult<()> {
        let m = array![[1., 2., 0., -1.], [0., 1., 3., 1.], [2., -1., 1., 0.]];
        let svd = scaled_right_singular_vectors(m.view(), 3, 1e-8)?;
        // the rows of D V' have squared norms d_i^2
        for (row, d) in svd.vectors.axis_iter(Axis(0)).zip(svd.singular_values.iter()) {
            assert_abs_diff_eq!(row.dot(&row), d * d, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn regression_removes_factor() -> RuvResult<()> {
        let w = array![[1.], [-1.], [2.], [0.]];
        let signal = array![[0.5, 1., 0.], [0.5, 1., 0.], [0.5, 1., 0.], [0.5, 1., 0.]];
        let y = &signal + &w.dot(&array![[3., -2., 1.]]);
        let (alpha, corrected) = regress_out(y.view(), w.view())?;
        // the constant signal is not orthogonal to w, so only check the fitted
        // part is removed
        let resid_proj = w.t().dot(&corrected);
        assert_abs_diff_eq!(resid_proj, Array2::<f64>::zeros((1, 3)), epsilon = 1e-10);
        assert_eq!(alpha.dim(), (1, 3));
        Ok(())
    }
}
