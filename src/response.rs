//! Response distributions for count regression

use crate::{
    error::{RuvError, RuvResult},
    num::Float,
};
use num_traits::ToPrimitive;

pub mod negative_binomial;
pub mod poisson;

pub use negative_binomial::NegativeBinomial;
pub use poisson::Poisson;

/// Describes the domain of the response variable. Counts may be stored as
/// unsigned integers or as floats holding whole, non-negative numbers.
pub trait Response {
    /// Converts the observation to a floating-point value for IRLS.
    fn into_float<F: Float>(self) -> RuvResult<F>;
}

macro_rules! impl_unsigned_response {
    ($($t:ty),*) => {
        $(
            impl Response for $t {
                fn into_float<F: Float>(self) -> RuvResult<F> {
                    F::from(self).ok_or_else(|| RuvError::InvalidY(self.to_string()))
                }
            }
        )*
    };
}
impl_unsigned_response!(u8, u16, u32, u64, usize);

// Floating counts come from the CSV readers. Non-integer values are allowed
// (e.g. estimated counts) but they must be finite and non-negative.
impl Response for f64 {
    fn into_float<F: Float>(self) -> RuvResult<F> {
        if !self.is_finite() || self < 0. {
            return Err(RuvError::InvalidY(self.to_string()));
        }
        F::from(self).ok_or_else(|| RuvError::InvalidY(self.to_string()))
    }
}

impl Response for f32 {
    fn into_float<F: Float>(self) -> RuvResult<F> {
        self.to_f64()
            .ok_or_else(|| RuvError::InvalidY(self.to_string()))?
            .into_float()
    }
}
