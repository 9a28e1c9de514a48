//! Count matrix representation for RNA-seq data.
//!
//! Counts are stored genes x samples, the layout of count tables on disk. The
//! factor estimation works with the transposed log counts, samples x genes.

use crate::error::{RuvError, RuvResult};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::collections::HashMap;

/// Deduplicate names by appending _1, _2, etc. to repeats
fn deduplicate_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    names
        .into_iter()
        .map(|name| {
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                name
            } else {
                let renamed = format!("{}_{}", name, *count - 1);
                log::warn!("Duplicate gene name '{}' renamed to '{}'", name, renamed);
                renamed
            }
        })
        .collect()
}

fn check_dims(values: &Array2<f64>, gene_ids: &[String], sample_ids: &[String]) -> RuvResult<()> {
    let (n_genes, n_samples) = values.dim();
    if gene_ids.len() != n_genes {
        return Err(RuvError::BadInput(format!(
            "{} gene ids for {} rows",
            gene_ids.len(),
            n_genes
        )));
    }
    if sample_ids.len() != n_samples {
        return Err(RuvError::BadInput(format!(
            "{} sample ids for {} columns",
            sample_ids.len(),
            n_samples
        )));
    }
    Ok(())
}

/// A matrix of read counts with gene and sample identifiers.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Raw count data (genes x samples)
    counts: Array2<f64>,
    gene_ids: Vec<String>,
    sample_ids: Vec<String>,
    /// The values are already log-transformed expression, not counts.
    log_scale: bool,
}

impl CountMatrix {
    /// Create a new count matrix, validating that the identifiers match the
    /// dimensions and that all values are non-negative and finite.
    pub fn new(counts: Array2<f64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> RuvResult<Self> {
        check_dims(&counts, &gene_ids, &sample_ids)?;
        if counts.iter().any(|&x| !x.is_finite() || x < 0.) {
            return Err(RuvError::InvalidCounts(
                "counts must be non-negative finite values".to_string(),
            ));
        }
        if !counts.is_empty() && counts.iter().all(|&x| x == 0.) {
            return Err(RuvError::InvalidCounts(
                "all samples have 0 counts for all genes".to_string(),
            ));
        }
        if counts.iter().any(|&x| x != x.round()) {
            log::warn!("Some count values are not integers; normalized counts will be left on the log scale");
        }
        Ok(Self {
            counts,
            gene_ids: deduplicate_names(gene_ids),
            sample_ids,
            log_scale: false,
        })
    }

    /// Wrap expression values that are already on the log scale, such as
    /// log-CPM. Only finiteness is required; negative values are allowed.
    pub fn from_log_values(values: Array2<f64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> RuvResult<Self> {
        check_dims(&values, &gene_ids, &sample_ids)?;
        if values.iter().any(|x| !x.is_finite()) {
            return Err(RuvError::InvalidCounts(
                "log-scale values must be finite".to_string(),
            ));
        }
        Ok(Self {
            counts: values,
            gene_ids: deduplicate_names(gene_ids),
            sample_ids,
            log_scale: true,
        })
    }

    /// Create from integer counts with generated identifiers, `gene_1..` and
    /// `sample_1..`.
    pub fn from_integers(counts: Array2<u32>) -> RuvResult<Self> {
        let (n_genes, n_samples) = counts.dim();
        let gene_ids = (1..=n_genes).map(|i| format!("gene_{}", i)).collect();
        let sample_ids = (1..=n_samples).map(|j| format!("sample_{}", j)).collect();
        Self::new(counts.mapv(f64::from), gene_ids, sample_ids)
    }

    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    /// The raw counts, genes x samples.
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    /// Whether the matrix holds log-scale values rather than counts.
    pub fn is_log_scale(&self) -> bool {
        self.log_scale
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Counts for a specific gene across samples
    pub fn gene_counts(&self, gene_idx: usize) -> ArrayView1<'_, f64> {
        self.counts.row(gene_idx)
    }

    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|id| id == gene_id)
    }

    /// Look up the indices of a list of gene identifiers. Unknown identifiers
    /// are skipped with a warning; the result is sorted and free of repeats.
    pub fn gene_indices<S: AsRef<str>>(&self, gene_ids: &[S]) -> Vec<usize> {
        let lookup: HashMap<&str, usize> = self
            .gene_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let mut indices: Vec<usize> = gene_ids
            .iter()
            .filter_map(|id| {
                let found = lookup.get(id.as_ref()).copied();
                if found.is_none() {
                    log::warn!("Control gene '{}' not found in the count matrix", id.as_ref());
                }
                found
            })
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Sum of counts per sample (library size)
    pub fn library_sizes(&self) -> Vec<f64> {
        self.counts.axis_iter(Axis(1)).map(|col| col.sum()).collect()
    }

    /// Whether every count is a whole number, i.e. the data are raw counts
    /// rather than already transformed values.
    pub fn is_whole_number(&self) -> bool {
        self.counts.iter().all(|&x| x == x.round())
    }

    /// Keep genes with more than `min_count` reads in at least `min_samples`
    /// samples.
    pub fn filter_expressed(&self, min_count: f64, min_samples: usize) -> RuvResult<Self> {
        let keep: Vec<usize> = self
            .counts
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| row.iter().filter(|&&x| x > min_count).count() >= min_samples)
            .map(|(i, _)| i)
            .collect();
        if keep.is_empty() {
            return Err(RuvError::InvalidCounts(
                "no genes passed the expression filter".to_string(),
            ));
        }
        log::info!("{} of {} genes pass the expression filter", keep.len(), self.n_genes());
        self.subset_genes(&keep)
    }

    /// Subset to specific genes, in the given order
    pub fn subset_genes(&self, gene_indices: &[usize]) -> RuvResult<Self> {
        if let Some(&index) = gene_indices.iter().find(|&&i| i >= self.n_genes()) {
            return Err(RuvError::OutOfRange {
                index,
                len: self.n_genes(),
                what: "genes",
            });
        }
        let counts = self.counts.select(Axis(0), gene_indices);
        let gene_ids = gene_indices.iter().map(|&i| self.gene_ids[i].clone()).collect();
        if self.log_scale {
            Self::from_log_values(counts, gene_ids, self.sample_ids.clone())
        } else {
            Self::new(counts, gene_ids, self.sample_ids.clone())
        }
    }

    /// Y, the samples x genes matrix the factors are estimated from:
    /// log(x + epsilon), or the values as given if they are already on the
    /// log scale.
    pub fn log_samples_by_genes(&self, epsilon: f64, is_log: bool) -> Array2<f64> {
        if is_log || self.log_scale {
            self.counts.t().to_owned()
        } else {
            self.counts.t().mapv(|x| (x + epsilon).ln())
        }
    }
}
