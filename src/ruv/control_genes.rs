//! RUVg: factors from negative control genes

use super::{corrected_counts, RuvFit, RuvOptions};
use crate::{
    counts::CountMatrix,
    error::{RuvError, RuvResult},
    factor::{left_singular_vectors, regress_out},
    transform::center_columns,
    utility::select_columns,
};
use ndarray::Array2;

/// Estimate W from the log counts of genes assumed not to respond to the
/// covariates of interest. The factors are the leading left singular vectors
/// of the (centered) control-gene columns of Y; every gene is then regressed
/// on them.
pub fn ruv_g(counts: &CountMatrix, control_genes: &[usize], options: &RuvOptions) -> RuvResult<RuvFit> {
    if control_genes.is_empty() {
        return Err(RuvError::NoControls("genes"));
    }
    let y: Array2<f64> = counts.log_samples_by_genes(options.epsilon, options.is_log);
    let controls = select_columns(y.view(), control_genes, "genes")?;
    let controls = if options.center {
        center_columns(controls.view())
    } else {
        controls
    };

    let svd = left_singular_vectors(controls.view(), options.k, options.drop, options.tolerance)?;
    let w = svd.vectors;
    let (alpha, corrected) = regress_out(y.view(), w.view())?;
    log::info!(
        "RUVg: {} factor(s) from {} control genes",
        w.ncols(),
        control_genes.len()
    );
    Ok(RuvFit {
        normalized: corrected_counts(corrected.view(), counts, options),
        k: w.ncols(),
        w,
        alpha,
        singular_values: svd.singular_values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn batch_counts() -> CountMatrix {
        // samples 0-2 and 3-5 come from two batches; control genes 0-3 show
        // only the batch shift
        let counts = array![
            [100., 110., 95., 200., 210., 190.],
            [50., 55., 45., 100., 105., 98.],
            [80., 76., 84., 160., 170., 150.],
            [30., 33., 29., 61., 58., 63.],
            [40., 42., 38., 300., 310., 295.],
            [500., 520., 480., 1000., 980., 1020.]
        ];
        CountMatrix::from_integers(counts.mapv(|c: f64| c as u32)).expect("valid counts")
    }

    #[test]
    fn factor_separates_batches() -> RuvResult<()> {
        let counts = batch_counts();
        let fit = ruv_g(&counts, &[0, 1, 2, 3], &RuvOptions::new(1))?;
        assert_eq!(fit.w.dim(), (6, 1));
        assert_eq!(fit.alpha.dim(), (1, 6));
        assert_eq!(fit.normalized.dim(), (6, 6));
        let w = fit.w.column(0);
        // the batches are on opposite sides
        assert!(w.iter().take(3).all(|&v| v * w[0] > 0.));
        assert!(w.iter().skip(3).all(|&v| v * w[0] < 0.));
        // unit norm
        assert_abs_diff_eq!(w.dot(&w), 1., epsilon = 1e-10);
        // the corrected counts are whole and non-negative
        assert!(fit.normalized.iter().all(|&v| v >= 0. && v == v.round()));
        Ok(())
    }

    #[test]
    fn correction_removes_batch_shift_from_controls() -> RuvResult<()> {
        let counts = batch_counts();
        let fit = ruv_g(&counts, &[0, 1, 2, 3], &RuvOptions::new(1).round(false))?;
        let log_norm = fit.normalized.mapv(|v| (v + 1.).ln());
        for gene in 0..4 {
            let row = log_norm.row(gene);
            let first: f64 = row.iter().take(3).sum::<f64>() / 3.;
            let second: f64 = row.iter().skip(3).sum::<f64>() / 3.;
            assert!((first - second).abs() < 0.15, "gene {} still shifted", gene);
        }
        Ok(())
    }

    #[test]
    fn log_input_stays_on_log_scale() -> RuvResult<()> {
        let counts = batch_counts();
        let logged = counts.counts().mapv(|c| (c + 1.).ln());
        let logged = CountMatrix::new(logged, counts.gene_ids().to_vec(), counts.sample_ids().to_vec())?;
        let opts = RuvOptions::new(1).is_log(true).round(false);
        let from_log = ruv_g(&logged, &[0, 1, 2, 3], &opts)?;
        let from_counts = ruv_g(&counts, &[0, 1, 2, 3], &RuvOptions::new(1).round(false))?;
        assert_abs_diff_eq!(
            from_log.normalized.mapv(f64::exp),
            from_counts.normalized.mapv(|v| v + 1.),
            epsilon = 1e-8
        );
        Ok(())
    }

    #[test]
    fn bad_controls_rejected() {
        let counts = batch_counts();
        assert!(matches!(
            ruv_g(&counts, &[], &RuvOptions::new(1)),
            Err(RuvError::NoControls(_))
        ));
        assert!(matches!(
            ruv_g(&counts, &[0, 17], &RuvOptions::new(1)),
            Err(RuvError::OutOfRange { index: 17, .. })
        ));
        assert!(matches!(
            ruv_g(&counts, &[0, 1, 2], &RuvOptions::new(1).drop(1)),
            Err(RuvError::DropTooLarge { .. })
        ));
        let zero_k = RuvOptions::new(0);
        assert!(ruv_g(&counts, &[0, 1, 2], &zero_k).is_err());
    }
}
