//! utility functions for internal library use

use crate::error::{RuvError, RuvResult};
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use num_traits::identities::One;

/// Prepend the input with a column of ones.
/// Used to incorporate a constant intercept term in a regression.
pub fn one_pad<T>(data: ArrayView2<T>) -> Array2<T>
where
    T: Copy + One,
{
    let ones: Array2<T> = Array2::ones((data.nrows(), 1));
    concatenate![Axis(1), ones, data]
}

/// Keep the listed columns, in order, checking that every index is in range.
pub fn select_columns(
    data: ArrayView2<f64>,
    columns: &[usize],
    what: &'static str,
) -> RuvResult<Array2<f64>> {
    if let Some(&index) = columns.iter().find(|&&c| c >= data.ncols()) {
        return Err(RuvError::OutOfRange {
            index,
            len: data.ncols(),
            what,
        });
    }
    Ok(data.select(Axis(1), columns))
}
