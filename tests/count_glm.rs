//! The count GLM behind the first-pass fits
mod common;

use anyhow::Result;
use approx::assert_abs_diff_eq;
use common::simulate;
use ndarray::{array, s, Array1, Array2};
use ndarray_ruv::{
    de::augment_design,
    design::group_design,
    response::{NegativeBinomial, Poisson},
    ruv::{ruv_g, RuvOptions},
    ModelBuilder,
};

#[test]
/// A constant offset only moves the intercept.
fn offset_shifts_intercept() -> Result<()> {
    let y: Array1<u32> = array![3, 5, 4, 12, 15, 9];
    let x: Array2<f64> = array![[0.], [0.], [0.], [1.], [1.], [1.]];
    let offsets: Array1<f64> = Array1::from_elem(6, 1.5);

    let plain = ModelBuilder::<f64, Poisson>::data(y.view(), x.view()).build()?;
    let plain_fit = plain.fit()?;
    let shifted = ModelBuilder::<f64, Poisson>::data(y.view(), x.view())
        .linear_offset(offsets)
        .build()?;
    let shifted_fit = shifted.fit()?;
    assert_abs_diff_eq!(shifted_fit.result[0], plain_fit.result[0] - 1.5, epsilon = 1e-8);
    assert_abs_diff_eq!(shifted_fit.result[1], plain_fit.result[1], epsilon = 1e-8);
    assert_abs_diff_eq!(shifted_fit.fitted(), plain_fit.fitted(), epsilon = 1e-6);
    Ok(())
}

#[test]
/// The likelihood ratio of nested fits is never significantly negative.
fn lr_test_sign() -> Result<()> {
    let sim = simulate(40, 10, 10, 11)?;
    let (full, _) = group_design(&sim.conditions)?;
    let family = NegativeBinomial::new(0.05)?;
    for g in 0..sim.counts.n_genes() {
        let y = sim.counts.gene_counts(g);
        let full_model = ModelBuilder::family(family, y, full.view()).no_constant().build()?;
        let reduced_model = ModelBuilder::family(family, y, full.slice(s![.., ..1]))
            .no_constant()
            .build()?;
        let full_fit = full_model.fit()?;
        let reduced_fit = reduced_model.fit()?;
        assert!(full_fit.lr_test_against(&reduced_fit) > -1e-6);
    }
    Ok(())
}

#[test]
/// A group with no counts has no finite maximum likelihood estimate; a ridge
/// penalty keeps the fit bounded while the intercept stays free.
fn ridge_bounds_empty_group() -> Result<()> {
    let y: Array1<u32> = array![0, 0, 0, 20, 25, 22];
    let x: Array2<f64> = array![[-1.], [-1.], [-1.], [1.], [1.], [1.]];
    let model = ModelBuilder::<f64, Poisson>::data(y.view(), x.view()).build()?;
    let fit = model.fit_options().l2_reg(1e-2).fit()?;
    assert!(fit.result.iter().all(|b| b.is_finite()));
    assert!(fit.result[1] > 1.);
    Ok(())
}

#[test]
/// A valid likelihood is returned when the initial guess is already the best.
fn start_at_optimum() -> Result<()> {
    let y: Array1<u32> = array![7, 7, 7, 7];
    let x: Array2<f64> = Array2::zeros((4, 0));
    let model = ModelBuilder::<f64, Poisson>::data(y.view(), x.view()).build()?;
    let fit = model.fit()?;
    assert!(fit.model_like.is_finite());
    assert_abs_diff_eq!(fit.result[0], 7f64.ln(), epsilon = 1e-6);
    assert_abs_diff_eq!(fit.deviance(), 0., epsilon = 1e-10);
    Ok(())
}

#[test]
/// Adding W to the design explains the batch: the deviance of a control gene
/// drops once the factor is included.
fn factors_as_covariates() -> Result<()> {
    let sim = simulate(100, 10, 40, 12)?;
    let fit = ruv_g(&sim.counts, &sim.control_genes, &RuvOptions::new(1))?;
    let (x, _) = group_design(&sim.conditions)?;
    let xw = augment_design(x.view(), fit.w.view())?;
    assert_eq!(xw.dim(), (8, 3));
    assert_eq!(xw.slice(s![.., ..2]), x);

    let family = NegativeBinomial::new(0.01)?;
    let gene = sim.control_genes[0];
    let y = sim.counts.gene_counts(gene);
    let without = ModelBuilder::family(family, y, x.view()).no_constant().build()?;
    let with = ModelBuilder::family(family, y, xw.view()).no_constant().build()?;
    assert!(with.fit()?.deviance() < 0.5 * without.fit()?.deviance());
    Ok(())
}
