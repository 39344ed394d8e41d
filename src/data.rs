//! Dataset types, extraction of the processed input file and CSV output
//! using Polars

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use polars::prelude::*;

use crate::config::FilePattern;
use crate::error::{PipelineError, Result};

/// Label column appended to the clustered output
pub const CLUSTER_COLUMN: &str = "Cluster";

/// Table exactly as extracted from the input file.
///
/// Every column is read as text; numeric coercion is the transformer's job.
#[derive(Debug, Clone)]
pub struct RawDataset {
    pub path: PathBuf,
    pub frame: DataFrame,
}

impl RawDataset {
    pub fn row_count(&self) -> usize {
        self.frame.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Trimmed text values of a column; blank cells become `None`
    pub fn text_column(&self, name: &str) -> Result<Vec<Option<String>>> {
        let column = self
            .frame
            .column(name)
            .map_err(|_| PipelineError::Schema(format!("column '{name}' not found")))?;
        let series = column
            .as_materialized_series()
            .cast(&DataType::String)
            .map_err(|e| self.format_error(e))?;
        let values = series
            .str()
            .map_err(|e| self.format_error(e))?
            .into_iter()
            .map(|value| {
                value
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
            })
            .collect();
        Ok(values)
    }

    fn format_error(&self, err: PolarsError) -> PipelineError {
        PipelineError::Format {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }
}

/// One employer row after cleaning
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub employer_id: String,
    pub region: Option<String>,
    /// Feature percentages, ordered like [`Dataset::feature_names`]
    pub values: Vec<f64>,
    /// Row index in the extracted table
    pub source_row: usize,
}

/// Ordered records sharing a feature schema
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    feature_names: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(feature_names: Vec<String>, records: Vec<Record>) -> Result<Self> {
        if let Some(bad) = records
            .iter()
            .find(|record| record.values.len() != feature_names.len())
        {
            return Err(PipelineError::Schema(format!(
                "record '{}' has {} values but the dataset has {} features",
                bad.employer_id,
                bad.values.len(),
                feature_names.len()
            )));
        }
        Ok(Self {
            feature_names,
            records,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|feature| feature == name)
    }

    /// Values of one feature column, in record order
    pub fn feature_values(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.feature_index(name)?;
        Some(self.records.iter().map(|r| r.values[index]).collect())
    }

    /// Feature matrix of shape (records, features)
    pub fn feature_matrix(&self) -> Array2<f64> {
        let n_features = self.feature_names.len();
        Array2::from_shape_fn((self.records.len(), n_features), |(row, col)| {
            self.records[row].values[col]
        })
    }

    /// Distinct regions, sorted
    pub fn regions(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .filter_map(|record| record.region.clone())
            .collect()
    }
}

/// Candidate dataset files in `dir`, sorted lexicographically
pub fn list_candidates(dir: &Path, pattern: &FilePattern) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PipelineError::NotFound(format!(
            "input directory {} does not exist",
            dir.display()
        )));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
        let is_file = entry
            .file_type()
            .map(|file_type| file_type.is_file())
            .unwrap_or(false);
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_file && pattern.matches(&name) {
            names.push(name);
        }
    }
    names.sort();

    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}

/// Load the first candidate dataset file from `dir`
///
/// # Errors
/// * `NotFound` when the directory is missing or holds no matching file
/// * `Format` when the selected file is not a readable CSV
pub fn extract_dataset(dir: &Path, pattern: &FilePattern) -> Result<RawDataset> {
    let candidates = list_candidates(dir, pattern)?;
    let Some(path) = candidates.into_iter().next() else {
        return Err(PipelineError::NotFound(format!(
            "no '{}*.{}' file in {}",
            pattern.prefix,
            pattern.extension,
            dir.display()
        )));
    };

    tracing::info!(file = %path.display(), "selected input dataset");
    let frame = read_csv(&path)?;
    tracing::debug!(shape = ?frame.shape(), "input dataset loaded");

    Ok(RawDataset { path, frame })
}

/// Read a CSV file with every column as text
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| PipelineError::Format {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    if frame.width() == 0 {
        return Err(PipelineError::Format {
            path: path.to_path_buf(),
            message: "file has no header row".to_string(),
        });
    }
    Ok(frame)
}

/// Write a frame as CSV with a header row, replacing any existing file
pub fn write_csv(path: &Path, frame: &mut DataFrame) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
    }
    let mut file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(frame)
        .map_err(|e| PipelineError::io(path, std::io::Error::other(e.to_string())))
}

/// The surviving raw rows with cleaned feature columns and a `Cluster` label
pub fn clustered_frame(raw: &RawDataset, dataset: &Dataset, labels: &[usize]) -> Result<DataFrame> {
    if labels.len() != dataset.len() {
        return Err(PipelineError::Schema(format!(
            "{} cluster labels for {} records",
            labels.len(),
            dataset.len()
        )));
    }

    let rows: Vec<IdxSize> = dataset
        .records()
        .iter()
        .map(|record| record.source_row as IdxSize)
        .collect();
    let indices = IdxCa::from_vec("row".into(), rows);
    let mut frame = raw.frame.take(&indices).map_err(|e| raw.format_error(e))?;

    for (index, name) in dataset.feature_names().iter().enumerate() {
        let values: Vec<f64> = dataset.records().iter().map(|r| r.values[index]).collect();
        frame
            .with_column(Column::new(name.as_str().into(), values))
            .map_err(|e| raw.format_error(e))?;
    }
    let labels: Vec<u32> = labels.iter().map(|&label| label as u32).collect();
    frame
        .with_column(Column::new(CLUSTER_COLUMN.into(), labels))
        .map_err(|e| raw.format_error(e))?;

    Ok(frame)
}
