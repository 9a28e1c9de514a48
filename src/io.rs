//! Reading count tables, sample tables and gene lists, and writing results.

use crate::{
    counts::CountMatrix,
    error::{RuvError, RuvResult},
};
use ndarray::{Array2, ArrayView2};
use serde::Serialize;
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter},
    path::Path,
};

/// Tab if the header line has one, comma otherwise.
fn detect_delimiter(path: &Path) -> RuvResult<u8> {
    let mut header = String::new();
    BufReader::new(File::open(path)?).read_line(&mut header)?;
    Ok(if header.contains('\t') { b'\t' } else { b',' })
}

fn table_reader(path: &Path) -> RuvResult<csv::Reader<File>> {
    let delimiter = detect_delimiter(path)?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

/// Read a count table: a header row of sample ids, then one row per gene
/// with the gene id in the first column. Comma and tab delimiters are
/// detected from the header.
pub fn read_count_matrix<P: AsRef<Path>>(path: P) -> RuvResult<CountMatrix> {
    let (values, gene_ids, sample_ids) = read_numeric_table(path.as_ref())?;
    CountMatrix::new(values, gene_ids, sample_ids)
}

/// Read a table of log-scale expression values laid out like a count table.
/// Negative values are allowed.
pub fn read_log_matrix<P: AsRef<Path>>(path: P) -> RuvResult<CountMatrix> {
    let (values, gene_ids, sample_ids) = read_numeric_table(path.as_ref())?;
    CountMatrix::from_log_values(values, gene_ids, sample_ids)
}

fn read_numeric_table(path: &Path) -> RuvResult<(Array2<f64>, Vec<String>, Vec<String>)> {
    let mut reader = table_reader(path)?;
    let sample_ids: Vec<String> = reader.headers()?.iter().skip(1).map(str::to_string).collect();
    if sample_ids.is_empty() {
        return Err(RuvError::InvalidCounts(
            "the count table has no sample columns".to_string(),
        ));
    }
    let n_samples = sample_ids.len();

    let mut gene_ids: Vec<String> = Vec::new();
    let mut values: Vec<f64> = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != n_samples + 1 {
            return Err(RuvError::InvalidCounts(format!(
                "row {} has {} columns, expected {}",
                gene_ids.len() + 1,
                record.len(),
                n_samples + 1
            )));
        }
        let mut fields = record.iter();
        gene_ids.push(fields.next().unwrap_or_default().to_string());
        for field in fields {
            let value: f64 = field
                .parse()
                .map_err(|_| RuvError::InvalidCounts(format!("invalid count value: {}", field)))?;
            values.push(value);
        }
    }
    if gene_ids.is_empty() {
        return Err(RuvError::InvalidCounts(
            "no genes found in the count table".to_string(),
        ));
    }
    let counts = Array2::from_shape_vec((gene_ids.len(), n_samples), values)?;
    log::info!(
        "Read {} genes x {} samples from {}",
        gene_ids.len(),
        n_samples,
        path.display()
    );
    Ok((counts, gene_ids, sample_ids))
}

/// Sample annotations: one row per sample, one named column per covariate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleTable {
    pub sample_ids: Vec<String>,
    pub column_names: Vec<String>,
    /// The values of each column, in sample order.
    pub columns: Vec<Vec<String>>,
}

impl SampleTable {
    pub fn column(&self, name: &str) -> RuvResult<&[String]> {
        self.column_names
            .iter()
            .position(|c| c == name)
            .map(|i| self.columns[i].as_slice())
            .ok_or_else(|| RuvError::BadInput(format!("no column '{}' in the sample table", name)))
    }

    /// The values of a column for the given samples, in their order. Every
    /// sample must be present in the table.
    pub fn labels_for<S: AsRef<str>>(&self, sample_ids: &[S], column: &str) -> RuvResult<Vec<String>> {
        let values = self.column(column)?;
        sample_ids
            .iter()
            .map(|id| {
                self.sample_ids
                    .iter()
                    .position(|s| s == id.as_ref())
                    .map(|i| values[i].clone())
                    .ok_or_else(|| {
                        RuvError::BadInput(format!(
                            "sample '{}' is missing from the sample table",
                            id.as_ref()
                        ))
                    })
            })
            .collect()
    }
}

/// Read a sample table with the sample ids in the first column and named
/// covariates in the others.
pub fn read_sample_table<P: AsRef<Path>>(path: P) -> RuvResult<SampleTable> {
    let mut reader = table_reader(path.as_ref())?;
    let column_names: Vec<String> = reader.headers()?.iter().skip(1).map(str::to_string).collect();
    if column_names.is_empty() {
        return Err(RuvError::BadInput(
            "the sample table needs at least one covariate column".to_string(),
        ));
    }
    let mut sample_ids = Vec::new();
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); column_names.len()];
    for record in reader.records() {
        let record = record?;
        let mut fields = record.iter();
        sample_ids.push(fields.next().unwrap_or_default().to_string());
        for (column, field) in columns.iter_mut().zip(fields) {
            column.push(field.to_string());
        }
    }
    Ok(SampleTable {
        sample_ids,
        column_names,
        columns,
    })
}

/// Read a list of gene ids, one per line. Blank lines and lines starting
/// with `#` are skipped.
pub fn read_gene_list<P: AsRef<Path>>(path: P) -> RuvResult<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut genes = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let gene = line.trim();
        if gene.is_empty() || gene.starts_with('#') {
            continue;
        }
        genes.push(gene.to_string());
    }
    Ok(genes)
}

/// Write a list of gene ids, one per line.
pub fn write_gene_list<P: AsRef<Path>, S: AsRef<str>>(path: P, genes: &[S]) -> RuvResult<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    for gene in genes {
        writer.write_record([gene.as_ref()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a matrix as CSV with row and column names. The header's first cell
/// is empty.
pub fn write_matrix<P, R, C>(
    path: P,
    row_names: &[R],
    col_names: &[C],
    matrix: ArrayView2<f64>,
) -> RuvResult<()>
where
    P: AsRef<Path>,
    R: AsRef<str>,
    C: AsRef<str>,
{
    if matrix.dim() != (row_names.len(), col_names.len()) {
        return Err(RuvError::BadInput(format!(
            "{} row and {} column names for a {:?} matrix",
            row_names.len(),
            col_names.len(),
            matrix.dim()
        )));
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(std::iter::once("").chain(col_names.iter().map(AsRef::as_ref)))?;
    for (name, row) in row_names.iter().zip(matrix.rows()) {
        let record = std::iter::once(name.as_ref().to_string()).chain(row.iter().map(|v| v.to_string()));
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write any serializable summary as pretty-printed JSON.
pub fn write_summary<P: AsRef<Path>, T: Serialize>(path: P, summary: &T) -> RuvResult<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, summary)?;
    Ok(())
}
