//! numerical trait constraints
use ndarray::ScalarOperand;
use ndarray_linalg::Lapack;

/// Floating-point types the count regressions are generic over. LAPACK support
/// is needed for the IRLS solves and the thread bounds for fitting genes in
/// parallel.
pub trait Float: Sized + num_traits::Float + Lapack + ScalarOperand + Send + Sync {}

impl Float for f32 {}
impl Float for f64 {}
