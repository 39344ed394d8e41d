//! Persisting evaluation metrics as scalar text files

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::state::Stage;

/// Written in place of a value that is mathematically undefined
pub const UNDEFINED: &str = "undefined";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Silhouette,
    RSquared,
}

impl MetricKind {
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Silhouette => "silhouette_score",
            MetricKind::RSquared => "regression_r2",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.txt", self.name())
    }
}

/// A named scalar and the stage that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationMetric {
    kind: MetricKind,
    stage: Stage,
    value: Option<f64>,
}

impl EvaluationMetric {
    pub fn silhouette(value: Option<f64>) -> Self {
        Self {
            kind: MetricKind::Silhouette,
            stage: Stage::Cluster,
            value,
        }
    }

    pub fn r_squared(value: Option<f64>) -> Self {
        Self {
            kind: MetricKind::RSquared,
            stage: Stage::Regress,
            value,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// `None` when the metric is undefined for this run
    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

impl fmt::Display for EvaluationMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `{}` on f64 prints the shortest text that parses back exactly
        match self.value {
            Some(value) => write!(f, "{}: {}", self.kind.name(), value),
            None => write!(f, "{}: {}", self.kind.name(), UNDEFINED),
        }
    }
}

/// Write each metric to `<dir>/<metric name>.txt`, replacing earlier runs
pub fn write_metrics(dir: &Path, metrics: &[EvaluationMetric]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;

    metrics
        .iter()
        .map(|metric| {
            let path = dir.join(metric.kind.file_name());
            let mut file = File::create(&path).map_err(|e| PipelineError::io(&path, e))?;
            writeln!(file, "{metric}").map_err(|e| PipelineError::io(&path, e))?;
            tracing::info!(file = %path.display(), "{metric}");
            Ok(path)
        })
        .collect()
}

/// Read a metric file written by [`write_metrics`]
///
/// Returns `Ok(None)` for an undefined metric.
pub fn read_metric(path: &Path) -> Result<Option<f64>> {
    let contents = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let format_error = |message: String| PipelineError::Format {
        path: path.to_path_buf(),
        message,
    };

    let line = contents
        .lines()
        .next()
        .ok_or_else(|| format_error("metric file is empty".to_string()))?;
    let (_, value) = line
        .split_once(':')
        .ok_or_else(|| format_error(format!("expected '<name>: <value>', got '{line}'")))?;
    let value = value.trim();

    if value == UNDEFINED {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|e| format_error(format!("invalid metric value '{value}': {e}")))
}
