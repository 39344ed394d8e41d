//! Sequential pipeline driver
//!
//! Runs extract, transform, cluster, regress, evaluate and compare in order.
//! Each stage logs start and success or error through the injected
//! [`StageLog`]; the first failing stage stops the run.

use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;

use crate::compare::{compare_clusters, ComparisonResult, RegionalReference};
use crate::config::PipelineConfig;
use crate::data::{clustered_frame, extract_dataset, write_csv, Dataset};
use crate::error::{PipelineError, Result};
use crate::evaluate::{write_metrics, EvaluationMetric};
use crate::model::{fit_kmeans, ClusterModel};
use crate::regression::{fit_regression, RegressionModel};
use crate::report::{data_dictionary, missing_values_summary, value_counts};
use crate::stage_log::{StageLog, StageStatus};
use crate::state::{PipelineState, RunState, Stage};
use crate::stats::{describe, summary_frame, FeatureSummary};
use crate::transform::{transform_dataset, TransformReport};
use crate::viz::ChartRenderer;

pub const CLUSTERED_FILE: &str = "clustered_employers.csv";
pub const COMPARATIVE_REGION_FILE: &str = "comparative_region.csv";
pub const COMPARISON_FILE: &str = "cluster_region_comparison.csv";
pub const DESCRIPTIVE_STATS_FILE: &str = "descriptive_stats.csv";
pub const MISSING_VALUES_FILE: &str = "missing_values_summary.csv";
pub const DATA_DICTIONARY_FILE: &str = "data_dictionary_analyzed.csv";
pub const DESCRIPTIVE_STATS_CHART_FILE: &str = "descriptive_stats_barplot.png";
pub const COMPARISON_CHART_FILE: &str = "comparison_chart.png";
pub const CLUSTER_SIZES_CHART_FILE: &str = "cluster_sizes.png";
pub const CLUSTER_SCATTER_FILE: &str = "clustered_employers_plot.png";

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub state: RunState,
    pub input_file: PathBuf,
    pub transform: TransformReport,
    pub cluster_sizes: Vec<usize>,
    pub cluster_labels: Vec<usize>,
    pub inertia: f64,
    pub silhouette: Option<f64>,
    pub regression: RegressionModel,
    pub evaluation_files: Vec<PathBuf>,
    pub analysis_files: Vec<PathBuf>,
    pub chart_files: Vec<PathBuf>,
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| crate::evaluate::UNDEFINED.to_string(), |v| format!("{v:.4}"))
}

/// Run one stage, logging its outcome and advancing the run state
fn run_stage<T>(
    stage: Stage,
    state: RunState,
    log: &dyn StageLog,
    body: impl FnOnce() -> Result<(T, String)>,
) -> Result<(T, RunState)> {
    log.record(stage, StageStatus::Start, &format!("{stage} started"));
    match body() {
        Ok((value, message)) => {
            log.record(stage, StageStatus::Success, &message);
            Ok((value, state.complete(stage)?))
        }
        Err(err) => {
            log.record(stage, StageStatus::Error, &err.to_string());
            let failed = state.fail(stage)?;
            tracing::debug!(state = %failed.current(), "run aborted");
            Err(err.in_stage(stage).with_run_state(failed))
        }
    }
}

fn write_analysis_csv(dir: &Path, name: &str, frame: &mut DataFrame) -> Result<PathBuf> {
    let path = dir.join(name);
    write_csv(&path, frame)?;
    tracing::debug!(file = %path.display(), "analysis table written");
    Ok(path)
}

/// Render a chart, downgrading failures to warnings
fn render_optional(path: PathBuf, render: impl FnOnce(&Path) -> Result<()>) -> Option<PathBuf> {
    match render(&path) {
        Ok(()) => Some(path),
        Err(err) => {
            tracing::warn!(file = %path.display(), "chart not rendered: {err}");
            None
        }
    }
}

fn value_counts_file(column: &str) -> String {
    format!("value_counts_{column}.csv")
}

/// Charts for the Compare stage; any failure, including creating the
/// output directory, is a warning
fn render_charts(
    config: &PipelineConfig,
    renderer: &dyn ChartRenderer,
    dataset: &Dataset,
    model: &ClusterModel,
    comparison: &ComparisonResult,
    summaries: &[FeatureSummary],
) -> Vec<PathBuf> {
    if let Err(err) = std::fs::create_dir_all(&config.output_dir) {
        tracing::warn!(dir = %config.output_dir.display(), "charts skipped: {err}");
        return Vec::new();
    }

    let chart = |name: &str| config.output_dir.join(name);
    let mut charts = Vec::new();
    charts.extend(render_optional(chart(COMPARISON_CHART_FILE), |path| {
        renderer.render_comparison(comparison, path)
    }));
    charts.extend(render_optional(chart(CLUSTER_SIZES_CHART_FILE), |path| {
        renderer.render_cluster_sizes(model, path)
    }));
    if dataset.feature_names().len() >= 2 {
        charts.extend(render_optional(chart(CLUSTER_SCATTER_FILE), |path| {
            renderer.render_clusters(dataset, model, path)
        }));
    }
    charts.extend(render_optional(chart(DESCRIPTIVE_STATS_CHART_FILE), |path| {
        renderer.render_descriptive_stats(summaries, path)
    }));
    charts
}

/// Run the full pipeline
///
/// # Errors
/// The first stage error, annotated with its [`Stage`]; configuration
/// errors are returned before any stage starts.
pub fn run_pipeline(
    config: &PipelineConfig,
    log: &dyn StageLog,
    renderer: &dyn ChartRenderer,
) -> Result<PipelineReport> {
    config.validate()?;
    let state = RunState::new();
    let mut analysis_files = Vec::new();

    let (raw, state) = run_stage(Stage::Extract, state, log, || {
        let raw = extract_dataset(&config.input_dir, &config.file_pattern)?;
        let message = format!("loaded {} rows from {}", raw.row_count(), raw.file_name());
        Ok((raw, message))
    })?;

    let (output, state) = run_stage(Stage::Transform, state, log, || {
        let output = transform_dataset(&raw, &config.schema)?;
        let summaries = describe(&output.dataset);
        let dir = &config.analysis_dir;

        let mut files = Vec::new();
        let mut stats = summary_frame(&summaries)?;
        files.push(write_analysis_csv(dir, DESCRIPTIVE_STATS_FILE, &mut stats)?);
        let mut missing = missing_values_summary(&raw)?;
        files.push(write_analysis_csv(dir, MISSING_VALUES_FILE, &mut missing)?);

        let kept_rows: Vec<usize> = output
            .dataset
            .records()
            .iter()
            .map(|record| record.source_row)
            .collect();
        for column in &config.schema.categorical_columns {
            if raw.has_column(column) {
                let mut counts = value_counts(&raw, column, &kept_rows)?;
                files.push(write_analysis_csv(dir, &value_counts_file(column), &mut counts)?);
            }
        }

        let report = output.report;
        let message = format!(
            "rows before={} after={} (duplicates={}, missing={}, out_of_range={})",
            report.input_rows,
            report.output_rows,
            report.dropped_duplicates,
            report.dropped_missing,
            report.dropped_out_of_range
        );
        Ok(((output, summaries, files), message))
    })?;
    let (output, summaries, transform_files) = output;
    analysis_files.extend(transform_files);
    let dataset = output.dataset;

    let (model, state) = run_stage(Stage::Cluster, state, log, || {
        let model = fit_kmeans(&dataset, &config.clustering)?;
        let labels = model.labels.to_vec();
        let mut frame = clustered_frame(&raw, &dataset, &labels)?;
        let mut dictionary = data_dictionary(&frame, &config.schema)?;
        let paths = [
            write_analysis_csv(&config.analysis_dir, CLUSTERED_FILE, &mut frame)?,
            write_analysis_csv(&config.analysis_dir, DATA_DICTIONARY_FILE, &mut dictionary)?,
        ];
        let message = format!(
            "k={} sizes={:?} inertia={:.4} silhouette={}",
            model.k,
            model.cluster_sizes(),
            model.inertia,
            format_optional(model.silhouette)
        );
        Ok(((model, paths), message))
    })?;
    let (model, cluster_files) = model;
    analysis_files.extend(cluster_files);

    let (regression, state) = run_stage(Stage::Regress, state, log, || {
        let regression =
            fit_regression(&dataset, &config.regression, &config.schema.region_column)?;
        let message = format!(
            "{} ~ {} on {} rows, r2={}",
            regression.target,
            regression.predictor_names.join(" + "),
            regression.n_rows,
            format_optional(regression.r2)
        );
        Ok((regression, message))
    })?;

    let (evaluation_files, state) = run_stage(Stage::Evaluate, state, log, || {
        let metrics = [
            EvaluationMetric::silhouette(model.silhouette),
            EvaluationMetric::r_squared(regression.r2),
        ];
        let files = write_metrics(&config.evaluation_dir, &metrics)?;
        let message = format!(
            "wrote {} metric files to {}",
            files.len(),
            config.evaluation_dir.display()
        );
        Ok((files, message))
    })?;

    let ((compare_files, chart_files), state) = run_stage(Stage::Compare, state, log, || {
        let region_column = config.schema.region_column.as_str();
        let derived = RegionalReference::from_dataset(&dataset);
        let reference = match &config.reference_file {
            Some(path) => RegionalReference::load(path, region_column)?,
            None => derived.clone(),
        };
        let comparison = compare_clusters(&dataset, &model, &reference)?;

        let mut regional = derived.to_frame(region_column)?;
        let mut compared = comparison.to_frame(region_column)?;
        let files = vec![
            write_analysis_csv(&config.analysis_dir, COMPARATIVE_REGION_FILE, &mut regional)?,
            write_analysis_csv(&config.analysis_dir, COMPARISON_FILE, &mut compared)?,
        ];

        let charts = if config.render_charts {
            render_charts(config, renderer, &dataset, &model, &comparison, &summaries)
        } else {
            Vec::new()
        };

        let message = format!(
            "{} cluster/region rows against {} regions, {} charts",
            comparison.rows.len(),
            comparison.reference.rows.len(),
            charts.len()
        );
        Ok(((files, charts), message))
    })?;
    analysis_files.extend(compare_files);

    let state = state.advance(PipelineState::Done)?;
    tracing::info!(state = %state.current(), "pipeline complete");

    Ok(PipelineReport {
        state,
        input_file: raw.path.clone(),
        transform: output.report,
        cluster_sizes: model.cluster_sizes(),
        cluster_labels: model.labels.to_vec(),
        inertia: model.inertia,
        silhouette: model.silhouette,
        regression,
        evaluation_files,
        analysis_files,
        chart_files,
    })
}
