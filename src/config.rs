//! Pipeline configuration: paths, column schema and model parameters

use std::path::PathBuf;

use crate::error::{PipelineError, Result};

/// A demographic percentage feature and the headcount column it can be
/// derived from when the percentage itself is absent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureColumn {
    pub name: String,
    pub count_column: Option<String>,
}

impl FeatureColumn {
    pub fn new(name: &str, count_column: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            count_column: count_column.map(str::to_string),
        }
    }
}

/// Columns the transformer reads from the raw table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub features: Vec<FeatureColumn>,
    /// Candidate total-headcount columns, first present wins
    pub total_columns: Vec<String>,
    pub region_column: String,
    pub id_column: String,
    /// Text columns whose value counts are reported
    pub categorical_columns: Vec<String>,
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self {
            features: vec![
                FeatureColumn::new("Pct_White", Some("WHT10")),
                FeatureColumn::new("Pct_Black", Some("BLKT10")),
                FeatureColumn::new("Pct_Hispanic", Some("HISPT10")),
                FeatureColumn::new("Pct_Asian", Some("ASIANT10")),
            ],
            total_columns: vec![
                "Total_Employees".to_string(),
                "TOTAL10".to_string(),
                "TOTAL1".to_string(),
            ],
            region_column: "Region".to_string(),
            id_column: "Employer_ID".to_string(),
            categorical_columns: ["Nation", "Region", "Division", "State"]
                .map(str::to_string)
                .to_vec(),
        }
    }
}

impl ColumnSchema {
    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }
}

/// Which files in the processed-data directory are dataset candidates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern {
    pub prefix: String,
    pub extension: String,
}

impl Default for FilePattern {
    fn default() -> Self {
        Self {
            prefix: "transformed_".to_string(),
            extension: "csv".to_string(),
        }
    }
}

impl FilePattern {
    pub fn matches(&self, file_name: &str) -> bool {
        let Some((stem, extension)) = file_name.rsplit_once('.') else {
            return false;
        };
        !stem.is_empty()
            && file_name.starts_with(&self.prefix)
            && extension.eq_ignore_ascii_case(&self.extension)
    }
}

/// KMeans parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    pub k: usize,
    pub max_iterations: u64,
    pub tolerance: f64,
    pub seed: u64,
    /// Rows scored for the silhouette; `None` scores every row
    pub silhouette_sample: Option<usize>,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            k: 3,
            max_iterations: 300,
            tolerance: 1e-4,
            seed: 42,
            silhouette_sample: Some(10_000),
        }
    }
}

/// Target and predictors for the linear regression.
///
/// A predictor naming the region column expands into one-hot indicators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegressionSpec {
    pub target: String,
    pub predictors: Vec<String>,
}

impl Default for RegressionSpec {
    fn default() -> Self {
        Self {
            target: "Pct_White".to_string(),
            predictors: vec!["Region".to_string()],
        }
    }
}

/// Everything a pipeline run needs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub analysis_dir: PathBuf,
    pub evaluation_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_file: PathBuf,
    /// Static regional averages; derived from the dataset when absent
    pub reference_file: Option<PathBuf>,
    pub render_charts: bool,
    pub file_pattern: FilePattern,
    pub schema: ColumnSchema,
    pub clustering: ClusterParams,
    pub regression: RegressionSpec,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/processed"),
            analysis_dir: PathBuf::from("data/analysis"),
            evaluation_dir: PathBuf::from("data/evaluation"),
            output_dir: PathBuf::from("data/outputs"),
            log_file: PathBuf::from("pipeline.log"),
            reference_file: None,
            render_charts: true,
            file_pattern: FilePattern::default(),
            schema: ColumnSchema::default(),
            clustering: ClusterParams::default(),
            regression: RegressionSpec::default(),
        }
    }
}

impl PipelineConfig {
    /// Lay every directory out under `root` using the default names
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            input_dir: root.join("processed"),
            analysis_dir: root.join("analysis"),
            evaluation_dir: root.join("evaluation"),
            output_dir: root.join("outputs"),
            log_file: root.join("pipeline.log"),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.clustering.k == 0 {
            return Err(PipelineError::Config(
                "number of clusters must be at least 1".to_string(),
            ));
        }
        if self.clustering.max_iterations == 0 {
            return Err(PipelineError::Config(
                "max iterations must be at least 1".to_string(),
            ));
        }
        if !(self.clustering.tolerance.is_finite() && self.clustering.tolerance > 0.0) {
            return Err(PipelineError::Config(format!(
                "tolerance must be a positive number, got {}",
                self.clustering.tolerance
            )));
        }
        if matches!(self.clustering.silhouette_sample, Some(n) if n < 2) {
            return Err(PipelineError::Config(
                "silhouette sample must cover at least 2 rows".to_string(),
            ));
        }
        if self.schema.features.is_empty() {
            return Err(PipelineError::Config(
                "at least one feature column is required".to_string(),
            ));
        }
        if self.regression.predictors.is_empty() {
            return Err(PipelineError::Config(
                "at least one regression predictor is required".to_string(),
            ));
        }
        Ok(())
    }
}
