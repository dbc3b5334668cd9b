pub mod pca;

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use pca::{Pca, PcaError};
use thiserror::Error;

use crate::config::{FailurePolicy, ReduceConfig};

#[derive(Error, Debug)]
pub enum ReduceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Non-numeric value {value:?} in row {row}, column {column:?}")]
    Parse {
        row: usize,
        column: String,
        value: String,
    },
    #[error("Table has no data rows")]
    Empty,
    #[error("PCA failed: {0}")]
    Pca(#[from] PcaError),
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
    #[error("{name}: {source}")]
    Song {
        name: String,
        #[source]
        source: Box<ReduceError>,
    },
}

#[derive(Debug)]
pub struct ReduceResult {
    /// Songs whose PCA summary made it into the combined table.
    pub reduced: u64,
    pub failed: u64,
    pub vector_len: usize,
}

/// One row of the combined table.
#[derive(Debug, Clone, PartialEq)]
pub struct SongSummary {
    pub name: String,
    pub vector: Vec<f64>,
}

/// Fit a PCA per feature table in `tables_dir` and write one combined CSV to `output`.
///
/// Rows follow file-name order. A table that can't be reduced is handled according to
/// `config.on_error`.
pub fn reduce_directory(
    tables_dir: &Path,
    output: &Path,
    config: &ReduceConfig,
    jobs: usize,
) -> std::result::Result<ReduceResult, ReduceError> {
    let files = crate::scanner::collect_files(tables_dir, &[crate::TABLE_EXTENSION])?;

    log::info!(
        "Reducing {} tables with {} workers ({} components x {} columns)",
        files.len(),
        jobs,
        config.components,
        config.column_cap
    );

    let pb = crate::progress_bar(files.len() as u64);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| ReduceError::ThreadPool(e.to_string()))?;

    let results: Vec<(PathBuf, Result<Vec<f64>, ReduceError>)> = pool.install(|| {
        use rayon::prelude::*;
        files
            .par_iter()
            .map(|path| {
                let result = reduce_table_file(path, config);
                pb.inc(1);
                (path.clone(), result)
            })
            .collect()
    });

    let mut summaries = Vec::with_capacity(results.len());
    let mut reduced: u64 = 0;
    let mut failed: u64 = 0;
    for (path, result) in results {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match result {
            Ok(vector) => {
                reduced += 1;
                summaries.push(SongSummary { name, vector });
            }
            Err(e) => {
                failed += 1;
                match config.on_error {
                    FailurePolicy::Abort => {
                        pb.abandon_with_message(format!("Failed on {}", name));
                        return Err(ReduceError::Song {
                            name,
                            source: Box::new(e),
                        });
                    }
                    FailurePolicy::ZeroRow => {
                        log::warn!("{}: {} (writing zero vector)", name, e);
                        summaries.push(SongSummary {
                            name,
                            vector: vec![0.0; config.vector_len()],
                        });
                    }
                    FailurePolicy::Skip => {
                        log::warn!("{}: {} (skipped)", name, e);
                    }
                }
            }
        }
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(output)?;
    write_combined(BufWriter::new(file), &summaries, config.vector_len())?;

    pb.finish_with_message(format!("Done: {} reduced, {} failed", reduced, failed));

    Ok(ReduceResult {
        reduced,
        failed,
        vector_len: config.vector_len(),
    })
}

/// Load one table and reduce it to its fixed-size vector.
pub fn reduce_table_file(
    path: &Path,
    config: &ReduceConfig,
) -> std::result::Result<Vec<f64>, ReduceError> {
    let matrix = read_table(File::open(path)?)?;
    log::debug!(
        "{}: {} windows x {} features",
        path.display(),
        matrix.nrows(),
        matrix.ncols()
    );
    summarize(&matrix, config)
}

/// PCA of one song's matrix, flattened into `components * column_cap` values.
pub fn summarize(
    matrix: &Array2<f64>,
    config: &ReduceConfig,
) -> std::result::Result<Vec<f64>, ReduceError> {
    let fitted = Pca::fit(matrix, config.components)?;
    Ok(fitted.fixed_summary(config.components, config.column_cap))
}

/// Parse a tab-separated feature table (with header) into a numeric matrix.
pub fn read_table<R: Read>(reader: R) -> std::result::Result<Array2<f64>, ReduceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let n_cols = headers.len();
    let mut values: Vec<f64> = Vec::new();
    let mut n_rows = 0;

    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        for (col, field) in record.iter().enumerate() {
            let value = field.trim().parse::<f64>().map_err(|_| ReduceError::Parse {
                row,
                column: headers.get(col).unwrap_or("?").to_string(),
                value: field.to_string(),
            })?;
            values.push(value);
        }
        n_rows += 1;
    }

    if n_rows == 0 || n_cols == 0 {
        return Err(ReduceError::Empty);
    }

    Array2::from_shape_vec((n_rows, n_cols), values).map_err(|_| ReduceError::Empty)
}

/// Write the combined table: a generated header `0..=len`, then `name, v0, v1, ...`.
pub fn write_combined<W: Write>(
    writer: W,
    summaries: &[SongSummary],
    vector_len: usize,
) -> std::result::Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record((0..=vector_len).map(|i| i.to_string()))?;
    for summary in summaries {
        let mut record = Vec::with_capacity(vector_len + 1);
        record.push(summary.name.clone());
        record.extend(summary.vector.iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}
