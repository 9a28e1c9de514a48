//! Estimation of the factors of unwanted variation in RNA-seq read counts
//! (RUVg, RUVs and RUVr), with the count GLM they are combined with.
//!
//! ```no_run
//! use ndarray_ruv::{io::read_count_matrix, ruv::{ruv_g, RuvOptions}};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let counts = read_count_matrix("counts.csv")?;
//! let controls = counts.gene_indices(&["ERCC-00002", "ERCC-00003"]);
//! let fit = ruv_g(&counts, &controls, &RuvOptions::new(1))?;
//! println!("{}", fit.w);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod counts;
pub mod de;
pub mod design;
pub mod error;
pub mod factor;
mod fit;
pub mod genewise;
mod glm;
pub mod io;
mod irls;
mod math;
mod model;
pub mod normalize;
pub mod num;
mod regularization;
pub mod response;
pub mod ruv;
pub mod transform;
mod utility;

pub use counts::CountMatrix;
pub use error::{RuvError, RuvResult};
pub use fit::{options::FitOptions, Fit};
pub use glm::Glm;
pub use model::{Dataset, Model, ModelBuilder};
pub use ruv::{RuvFit, RuvOptions};
