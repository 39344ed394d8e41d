//! EEOC workforce pipeline: a single-run batch pipeline over processed EEOC
//! employer CSV files.
//!
//! Stages run in order: extract the first matching dataset file, clean it
//! into demographic percentage features, cluster employers with K-Means,
//! fit a least-squares regression, write evaluation scores and compare
//! cluster profiles against regional averages.

pub mod cli;
pub mod compare;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluate;
pub mod model;
pub mod pipeline;
pub mod regression;
pub mod report;
pub mod stage_log;
pub mod state;
pub mod stats;
pub mod transform;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use compare::{compare_clusters, ComparisonResult, RegionalReference};
pub use config::{ClusterParams, ColumnSchema, FilePattern, PipelineConfig, RegressionSpec};
pub use data::{extract_dataset, Dataset, RawDataset, Record};
pub use error::{PipelineError, Result};
pub use evaluate::{read_metric, write_metrics, EvaluationMetric, MetricKind};
pub use model::{fit_kmeans, silhouette_score, ClusterModel};
pub use pipeline::{run_pipeline, PipelineReport};
pub use regression::{fit_regression, RegressionModel};
pub use report::{data_dictionary, missing_values_summary, value_counts};
pub use stage_log::{FileStageLog, MemoryStageLog, StageLog, StageStatus};
pub use state::{PipelineState, RunState, Stage};
pub use transform::{transform_dataset, TransformReport};
pub use viz::{BitmapRenderer, ChartRenderer};
