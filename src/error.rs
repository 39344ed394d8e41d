//! Error types shared by every pipeline stage

use std::path::PathBuf;

use crate::state::{PipelineState, RunState, Stage};

/// Errors produced while running the pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No input file (or directory) could be found
    #[error("not found: {0}")]
    NotFound(String),

    /// A file could not be parsed into a dataset
    #[error("format error in {path}: {message}")]
    Format { path: PathBuf, message: String },

    /// Required columns are absent or unusable
    #[error("schema error: {0}")]
    Schema(String),

    /// Too few rows for the requested model
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Cluster feature columns and reference columns disagree
    #[error("alignment error: {0}")]
    Alignment(String),

    /// Reading or writing an output file failed
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("clustering failed: {0}")]
    Clustering(String),

    #[error("regression failed: {0}")]
    Regression(String),

    #[error("chart rendering failed: {0}")]
    Render(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("illegal state transition from {from} to {to}")]
    InvalidTransition {
        from: PipelineState,
        to: PipelineState,
    },

    /// A stage error annotated with the stage it came from
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        /// Run state after the failure, ending in `Failed(stage)`
        run: Option<Box<RunState>>,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach the failing stage to an error
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            already @ Self::Stage { .. } => already,
            other => Self::Stage {
                stage,
                run: None,
                source: Box::new(other),
            },
        }
    }

    /// Attach the run state the failure left behind
    pub fn with_run_state(self, state: RunState) -> Self {
        match self {
            Self::Stage { stage, source, .. } => Self::Stage {
                stage,
                run: Some(Box::new(state)),
                source,
            },
            other => other,
        }
    }

    /// Run state of the aborted run, when the driver recorded one
    pub fn run_state(&self) -> Option<&RunState> {
        match self {
            Self::Stage { run, .. } => run.as_deref(),
            _ => None,
        }
    }

    /// Innermost error, with any stage annotation stripped
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stage the error was raised in, if it has been annotated
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, PipelineError>;
