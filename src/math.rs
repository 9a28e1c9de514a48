//! Mathematical helper functions
use num_traits::Float;

/// The product-logarithm function (not the W function) x * log(x). If x == 0, 0 is returned.
pub fn prod_log<F>(x: F) -> F
where
    F: Float,
{
    if x == F::zero() {
        return F::zero();
    }
    x * x.ln()
}

/// y * log(mu), taken to be zero when y is zero even if the mean underflows.
pub fn y_log_mu<F>(y: F, mu: F) -> F
where
    F: Float,
{
    if y == F::zero() {
        return F::zero();
    }
    y * mu.ln()
}

/// Returns 1 if x > 0, -1 if x < 0, and 0 if x == 0.
pub fn sign<F: Float>(x: F) -> F {
    // signum returns +-1 for +-0
    if x == F::zero() {
        F::zero()
    } else {
        x.signum()
    }
}

/// Quantile of a sample using linear interpolation between order statistics
/// (type 7, the default of R's `quantile`). The input does not need to be
/// sorted. Returns `None` for an empty sample.
pub fn quantile(values: &[f64], prob: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let h = (sorted.len() - 1) as f64 * prob.clamp(0., 1.);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}
