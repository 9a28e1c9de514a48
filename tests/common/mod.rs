//! Utility functions for testing
#![allow(dead_code)]

use anyhow::Result;
use ndarray::{Array2, ArrayView1};
use ndarray_ruv::CountMatrix;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::{fs::File, io::Write, path::Path};

/// Simulated counts with two conditions crossed with two batches.
pub struct Simulation {
    pub counts: CountMatrix,
    /// Condition label of each sample
    pub conditions: Vec<String>,
    /// 1 for samples of the second batch
    pub batch: Vec<f64>,
    /// Genes that respond to the condition
    pub de_genes: Vec<usize>,
    /// Genes that respond to neither condition
    pub control_genes: Vec<usize>,
}

/// 8 samples, conditions alternating a/b, the last four in a second batch
/// that shifts every gene by its own log fold change. The first `n_de` genes
/// change three-fold between conditions; the next `n_controls` are
/// designated controls.
pub fn simulate(n_genes: usize, n_de: usize, n_controls: usize, seed: u64) -> Result<Simulation> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0., 0.05)?;
    let conditions: Vec<String> = ["a", "b", "a", "b", "a", "b", "a", "b"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let batch = vec![0., 0., 0., 0., 1., 1., 1., 1.];
    let n_samples = conditions.len();

    let mut counts: Array2<f64> = Array2::zeros((n_genes, n_samples));
    for g in 0..n_genes {
        let base = 3. + 4. * rng.gen::<f64>();
        let batch_effect = 0.6 + 0.6 * rng.gen::<f64>();
        let de_effect = if g < n_de { 3f64.ln() } else { 0. };
        for s in 0..n_samples {
            let condition = if conditions[s] == "b" { de_effect } else { 0. };
            let log_mean = base + condition + batch_effect * batch[s] + noise.sample(&mut rng);
            counts[[g, s]] = log_mean.exp().round();
        }
    }
    let gene_ids = (0..n_genes).map(|g| format!("gene{:03}", g)).collect();
    let sample_ids = (0..n_samples).map(|s| format!("s{}", s + 1)).collect();
    Ok(Simulation {
        counts: CountMatrix::new(counts, gene_ids, sample_ids)?,
        conditions,
        batch,
        de_genes: (0..n_de).collect(),
        control_genes: (n_de..n_de + n_controls).collect(),
    })
}

/// The absolute Pearson correlation of two vectors. Factors are only defined
/// up to sign.
pub fn abs_correlation(a: ArrayView1<f64>, b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.sum() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let (mut cov, mut var_a, mut var_b) = (0., 0., 0.);
    for (&x, &y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    (cov / (var_a * var_b).sqrt()).abs()
}

/// Write the counts as a CSV table with a header of sample ids.
pub fn write_counts_csv(path: &Path, counts: &CountMatrix) -> Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "gene,{}", counts.sample_ids().join(","))?;
    for (gene, row) in counts.gene_ids().iter().zip(counts.counts().rows()) {
        let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(file, "{},{}", gene, values.join(","))?;
    }
    Ok(())
}

/// Write a sample table with a single `condition` column.
pub fn write_samples_csv(path: &Path, counts: &CountMatrix, conditions: &[String]) -> Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "sample,condition")?;
    for (sample, condition) in counts.sample_ids().iter().zip(conditions) {
        writeln!(file, "{},{}", sample, condition)?;
    }
    Ok(())
}
