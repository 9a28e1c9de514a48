//! define the error enum for factor estimation and count regression

use ndarray_linalg::error::LinalgError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuvError {
    #[error("Inconsistent input: {0}")]
    BadInput(String),
    #[error("Invalid count matrix: {0}")]
    InvalidCounts(String),
    #[error("Invalid response data: {0}")]
    InvalidY(String),
    #[error("Linear algebra")]
    LinalgError {
        #[from]
        source: LinalgError,
    },
    #[error("Decomposition did not produce {0}")]
    Decomposition(&'static str),
    #[error("Underconstrained data")]
    Underconstrained,
    #[error("Colinear data (X^T * X is not invertible)")]
    ColinearData,
    #[error("Maximum iterations ({0}) reached")]
    MaxIter(usize),
    #[error("'drop' ({drop}) must be less than 'k' ({k})")]
    DropTooLarge { drop: usize, k: usize },
    #[error("No singular value exceeds the tolerance {0}")]
    RankDeficient(f64),
    #[error("No control {0} supplied")]
    NoControls(&'static str),
    #[error("Index {index} out of range for {len} {what}")]
    OutOfRange {
        index: usize,
        len: usize,
        what: &'static str,
    },
    #[error("Array shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RuvResult<T> = Result<T, RuvError>;
