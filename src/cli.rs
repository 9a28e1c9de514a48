//! Command-line interface for the `ruv` binary

use crate::{
    counts::CountMatrix,
    de::{empirical_controls, lr_test},
    design::group_design,
    fit::options::FitOptions,
    genewise::estimate_common_dispersion,
    io::{read_count_matrix, read_gene_list, read_log_matrix, read_sample_table, write_gene_list, write_matrix, write_summary},
    normalize::{between_sample, glm_offsets, NormalizationMethod},
    response::NegativeBinomial,
    ruv::{deviance_residuals, ruv_g, ruv_r, ruv_s, ReplicateGroups, ResidualOptions, RuvFit, RuvOptions},
};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use ndarray::Array2;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "ruv")]
#[command(version)]
#[command(about = "Remove unwanted variation from RNA-seq read counts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Number of threads for the per-gene fits (0 = all cores)
    #[arg(long, global = true, default_value = "0")]
    pub threads: usize,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Between-sample normalization of the counts
    Normalize {
        #[command(flatten)]
        input: InputArgs,

        /// Normalization method
        #[arg(long, value_enum, default_value = "upper")]
        method: Method,

        /// Do not round the normalized counts
        #[arg(long)]
        no_round: bool,
    },
    /// Estimate factors of unwanted variation from negative control genes
    Ruvg {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        factors: FactorArgs,

        /// Control gene list, one gene id per line
        #[arg(long)]
        controls: PathBuf,
    },
    /// Estimate factors of unwanted variation from replicate samples
    Ruvs {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        factors: FactorArgs,

        #[command(flatten)]
        samples: SampleArgs,

        /// Control gene list [default: all genes]
        #[arg(long)]
        controls: Option<PathBuf>,
    },
    /// Estimate factors of unwanted variation from first-pass GLM residuals
    Ruvr {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        factors: FactorArgs,

        #[command(flatten)]
        samples: SampleArgs,

        /// Control gene list [default: all genes]
        #[arg(long)]
        controls: Option<PathBuf>,

        #[command(flatten)]
        first_pass: FirstPassArgs,
    },
    /// Select empirical control genes from a first-pass likelihood ratio test
    Empirical {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        samples: SampleArgs,

        /// Number of top-ranked genes to exclude from the controls
        #[arg(long, default_value = "5000")]
        exclude_top: usize,

        #[command(flatten)]
        first_pass: FirstPassArgs,
    },
}

/// Input and output paths shared by every subcommand
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Count table (CSV or TSV): gene ids in the first column, one column per sample
    #[arg(short, long)]
    pub counts: PathBuf,

    /// Prefix for the output files
    #[arg(short, long, default_value = "ruv")]
    pub prefix: String,

    /// Write a JSON summary of the run to this path
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Keep only genes with more than this many reads in --min-samples samples
    #[arg(long)]
    pub min_count: Option<f64>,

    /// Number of samples that must pass --min-count
    #[arg(long, default_value = "2")]
    pub min_samples: usize,
}

impl InputArgs {
    /// Read the input table, as log-scale values with `log_scale`.
    fn load(&self, log_scale: bool) -> Result<CountMatrix> {
        let read = if log_scale {
            read_log_matrix(&self.counts)
        } else {
            read_count_matrix(&self.counts)
        };
        let counts = read.with_context(|| format!("reading counts from {}", self.counts.display()))?;
        info!("{} genes, {} samples", counts.n_genes(), counts.n_samples());
        match self.min_count {
            Some(min_count) => Ok(counts.filter_expressed(min_count, self.min_samples)?),
            None => Ok(counts),
        }
    }

    fn output(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}_{}", self.prefix, suffix))
    }
}

/// Settings of the factor estimation
#[derive(Args, Debug)]
pub struct FactorArgs {
    /// Number of factors of unwanted variation
    #[arg(short, default_value = "1")]
    pub k: usize,

    /// Number of leading singular vectors to drop (RUVg and RUVr)
    #[arg(long, default_value = "0")]
    pub drop: usize,

    /// Pseudo-count added before taking logs
    #[arg(long, default_value = "1")]
    pub epsilon: f64,

    /// Singular values below this are treated as zero
    #[arg(long, default_value = "1e-8")]
    pub tolerance: f64,

    /// Do not round the normalized counts
    #[arg(long)]
    pub no_round: bool,

    /// Do not center the genes before the decomposition
    #[arg(long)]
    pub no_center: bool,

    /// The input is already on the log scale
    #[arg(long)]
    pub log_scale: bool,
}

impl FactorArgs {
    pub fn options(&self) -> RuvOptions {
        RuvOptions::new(self.k)
            .drop(self.drop)
            .epsilon(self.epsilon)
            .tolerance(self.tolerance)
            .round(!self.no_round && !self.log_scale)
            .center(!self.no_center)
            .is_log(self.log_scale)
    }
}

/// The sample annotation
#[derive(Args, Debug)]
pub struct SampleArgs {
    /// Sample table: sample ids in the first column, covariates in the others
    #[arg(short, long)]
    pub samples: PathBuf,

    /// Column of the sample table holding the group (condition) of each sample
    #[arg(short, long, default_value = "condition")]
    pub group: String,
}

impl SampleArgs {
    fn labels(&self, counts: &CountMatrix) -> Result<Vec<String>> {
        let table = read_sample_table(&self.samples)
            .with_context(|| format!("reading samples from {}", self.samples.display()))?;
        Ok(table.labels_for(counts.sample_ids(), &self.group)?)
    }
}

/// Settings of the first-pass negative binomial fit
#[derive(Args, Debug)]
pub struct FirstPassArgs {
    /// Common dispersion [default: estimated from the data]
    #[arg(long)]
    pub dispersion: Option<f64>,

    /// Normalization used as offsets in the fit
    #[arg(long, value_enum, default_value = "upper")]
    pub offsets: Method,

    /// Maximum IRLS iterations per gene
    #[arg(long, default_value = "50")]
    pub max_iter: usize,
}

impl FirstPassArgs {
    fn fit_options(&self) -> FitOptions<f64> {
        FitOptions {
            max_iter: self.max_iter,
            ..Default::default()
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Method {
    None,
    Median,
    Upper,
    Full,
}

impl From<Method> for NormalizationMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::None => NormalizationMethod::None,
            Method::Median => NormalizationMethod::Median,
            Method::Upper => NormalizationMethod::Upper,
            Method::Full => NormalizationMethod::Full,
        }
    }
}

/// What a run did, written with `--summary`.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub command: String,
    pub n_genes: usize,
    pub n_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_controls: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub singular_values: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<RuvOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispersion: Option<f64>,
    pub outputs: Vec<PathBuf>,
}

impl RunSummary {
    fn new(command: &str, counts: &CountMatrix) -> Self {
        Self {
            command: command.to_string(),
            n_genes: counts.n_genes(),
            n_samples: counts.n_samples(),
            ..Default::default()
        }
    }

    fn record_fit(&mut self, fit: &RuvFit, options: &RuvOptions, n_controls: usize) {
        self.k = Some(fit.k);
        self.singular_values = fit.singular_values.to_vec();
        self.options = Some(options.clone());
        self.n_controls = Some(n_controls);
    }
}

/// Resolve a control gene list against the counts, or use every gene.
fn control_indices(counts: &CountMatrix, path: Option<&Path>) -> Result<Vec<usize>> {
    let indices = match path {
        Some(path) => {
            let genes = read_gene_list(path)
                .with_context(|| format!("reading control genes from {}", path.display()))?;
            counts.gene_indices(&genes)
        }
        None => (0..counts.n_genes()).collect(),
    };
    if indices.is_empty() {
        bail!("none of the control genes are in the count table");
    }
    info!("Using {} control genes", indices.len());
    Ok(indices)
}

fn write_counts(path: &Path, counts: &CountMatrix, values: &Array2<f64>) -> Result<()> {
    write_matrix(path, counts.gene_ids(), counts.sample_ids(), values.view())?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Write W and the normalized counts of a factor fit.
fn write_fit(input: &InputArgs, counts: &CountMatrix, fit: &RuvFit, summary: &mut RunSummary) -> Result<()> {
    let w_path = input.output("W.csv");
    write_matrix(&w_path, counts.sample_ids(), &fit.w_names(), fit.w.view())?;
    info!("Wrote {}", w_path.display());
    let norm_path = input.output("normalized.csv");
    write_counts(&norm_path, counts, &fit.normalized)?;
    summary.outputs.extend([w_path, norm_path]);
    Ok(())
}

fn finish(input: &InputArgs, summary: &RunSummary) -> Result<()> {
    if let Some(path) = &input.summary {
        write_summary(path, summary)?;
        info!("Wrote summary to {}", path.display());
    }
    Ok(())
}

/// Run a parsed subcommand.
pub fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Normalize {
            input,
            method,
            no_round,
        } => {
            let counts = input.load(false)?;
            let mut summary = RunSummary::new("normalize", &counts);
            let method = NormalizationMethod::from(method);
            info!("Normalizing with the {} method", method);
            let normalized = between_sample(counts.counts(), method, !no_round)?;
            let path = input.output("normalized.csv");
            write_counts(&path, &counts, &normalized)?;
            summary.outputs.push(path);
            finish(&input, &summary)
        }
        Commands::Ruvg {
            input,
            factors,
            controls,
        } => {
            let counts = input.load(factors.log_scale)?;
            let mut summary = RunSummary::new("ruvg", &counts);
            let control_genes = control_indices(&counts, Some(controls.as_path()))?;
            let options = factors.options();
            let fit = ruv_g(&counts, &control_genes, &options)?;
            summary.record_fit(&fit, &options, control_genes.len());
            write_fit(&input, &counts, &fit, &mut summary)?;
            finish(&input, &summary)
        }
        Commands::Ruvs {
            input,
            factors,
            samples,
            controls,
        } => {
            let counts = input.load(factors.log_scale)?;
            let mut summary = RunSummary::new("ruvs", &counts);
            let labels = samples.labels(&counts)?;
            let groups = ReplicateGroups::from_labels(&labels);
            let control_genes = control_indices(&counts, controls.as_deref())?;
            let options = factors.options();
            let fit = ruv_s(&counts, &control_genes, &groups, &options)?;
            summary.record_fit(&fit, &options, control_genes.len());
            write_fit(&input, &counts, &fit, &mut summary)?;
            finish(&input, &summary)
        }
        Commands::Ruvr {
            input,
            factors,
            samples,
            controls,
            first_pass,
        } => {
            let counts = input.load(factors.log_scale)?;
            let mut summary = RunSummary::new("ruvr", &counts);
            let labels = samples.labels(&counts)?;
            let (x, names) = group_design(&labels)?;
            info!("First-pass design: {}", names.join(", "));
            let mut residual_options = ResidualOptions::default()
                .normalization(first_pass.offsets.into())
                .fit_options(first_pass.fit_options());
            if let Some(dispersion) = first_pass.dispersion {
                residual_options = residual_options.dispersion(dispersion);
            }
            let first = deviance_residuals(&counts, x.view(), &residual_options)?;
            summary.dispersion = Some(first.dispersion);

            let control_genes = control_indices(&counts, controls.as_deref())?;
            let options = factors.options();
            let fit = ruv_r(&counts, &control_genes, first.residuals.view(), &options)?;
            summary.record_fit(&fit, &options, control_genes.len());
            write_fit(&input, &counts, &fit, &mut summary)?;
            finish(&input, &summary)
        }
        Commands::Empirical {
            input,
            samples,
            exclude_top,
            first_pass,
        } => {
            let counts = input.load(false)?;
            let mut summary = RunSummary::new("empirical", &counts);
            let labels = samples.labels(&counts)?;
            let (full, _) = group_design(&labels)?;
            if full.ncols() < 2 {
                bail!("the group column '{}' has a single level", samples.group);
            }
            let reduced = Array2::ones((counts.n_samples(), 1));
            let offsets = glm_offsets(counts.counts(), first_pass.offsets.into())?;
            let dispersion = match first_pass.dispersion {
                Some(dispersion) => dispersion,
                None => estimate_common_dispersion(counts.counts(), full.view(), Some(offsets.view()))?,
            };
            summary.dispersion = Some(dispersion);
            let test = lr_test(
                counts.counts(),
                full.view(),
                reduced.view(),
                Some(offsets.view()),
                &NegativeBinomial::new(dispersion)?,
                &first_pass.fit_options(),
            )?;

            let table = Array2::from_shape_fn((counts.n_genes(), 3), |(g, j)| match j {
                0 => test.statistic[g],
                1 => test.p_values[g],
                _ => test.adjusted[g],
            });
            let test_path = input.output("lrt.csv");
            write_matrix(&test_path, counts.gene_ids(), &["statistic", "p_value", "padj"], table.view())?;

            let controls = empirical_controls(&test.p_values, exclude_top);
            info!(
                "{} empirical control genes after excluding the top {}",
                controls.len(),
                exclude_top
            );
            let genes: Vec<&str> = controls
                .iter()
                .map(|&g| counts.gene_ids()[g].as_str())
                .collect();
            let controls_path = input.output("empirical_controls.txt");
            write_gene_list(&controls_path, &genes)?;
            summary.n_controls = Some(controls.len());
            summary.outputs.extend([test_path, controls_path]);
            finish(&input, &summary)
        }
    }
}
