//! Chart rendering using Plotters
//!
//! Rendering sits behind [`ChartRenderer`] so the pipeline never depends on
//! a particular backend or on system fonts being present.

use std::path::Path;

use plotters::prelude::*;

use crate::compare::ComparisonResult;
use crate::data::Dataset;
use crate::error::{PipelineError, Result};
use crate::model::ClusterModel;
use crate::stats::FeatureSummary;

/// Color palette for different clusters
const CLUSTER_COLORS: [RGBColor; 5] = [RED, BLUE, GREEN, YELLOW, MAGENTA];

/// Shades for regional reference bars
const REGION_COLORS: [RGBColor; 4] = [
    RGBColor(96, 96, 96),
    RGBColor(140, 140, 140),
    RGBColor(180, 180, 180),
    RGBColor(210, 210, 210),
];

/// Fill for the descriptive statistics bars
const STATS_COLOR: RGBColor = RGBColor(135, 206, 235);

fn cluster_color(cluster: usize) -> RGBColor {
    CLUSTER_COLORS
        .get(cluster)
        .copied()
        .unwrap_or(BLACK)
}

fn region_color(index: usize) -> RGBColor {
    REGION_COLORS[index % REGION_COLORS.len()]
}

fn render_error<E: std::fmt::Display>(err: E) -> PipelineError {
    PipelineError::Render(err.to_string())
}

/// Produces chart artifacts for a pipeline run
pub trait ChartRenderer {
    /// Bar chart of cluster means next to regional averages, per feature
    fn render_comparison(&self, comparison: &ComparisonResult, path: &Path) -> Result<()>;

    /// Bar chart of cluster sizes
    fn render_cluster_sizes(&self, model: &ClusterModel, path: &Path) -> Result<()>;

    /// Scatter plot of the first two features, colored by cluster
    fn render_clusters(&self, dataset: &Dataset, model: &ClusterModel, path: &Path) -> Result<()>;

    /// Bar of each feature's mean with one standard deviation error bars
    fn render_descriptive_stats(&self, summaries: &[FeatureSummary], path: &Path) -> Result<()>;
}

/// PNG output through the Plotters bitmap backend
#[derive(Debug, Clone, Copy, Default)]
pub struct BitmapRenderer;

/// Horizontal extent of every bar in a grouped bar chart.
///
/// Group `g` is centered on `x = g`; its bars share 80% of the unit width.
pub fn bar_layout(n_groups: usize, bars_per_group: usize) -> Vec<Vec<(f64, f64)>> {
    let width = 0.8 / bars_per_group.max(1) as f64;
    (0..n_groups)
        .map(|group| {
            let start = group as f64 - 0.4;
            (0..bars_per_group)
                .map(|bar| {
                    let left = start + bar as f64 * width;
                    (left, left + width)
                })
                .collect()
        })
        .collect()
}

/// Upper y bound for the descriptive statistics chart: the highest
/// mean plus deviation with 10% headroom, ignoring undefined values
pub fn stats_axis_max(summaries: &[FeatureSummary]) -> f64 {
    let top = summaries
        .iter()
        .filter(|s| s.mean.is_finite())
        .map(|s| s.mean + if s.std.is_finite() { s.std } else { 0.0 })
        .fold(0.0, f64::max);
    (top * 1.1).max(1.0)
}

impl ChartRenderer for BitmapRenderer {
    fn render_comparison(&self, comparison: &ComparisonResult, path: &Path) -> Result<()> {
        let n_features = comparison.feature_names.len();
        let n_clusters = comparison.cluster_means.nrows();
        let regions = &comparison.reference.rows;
        let layout = bar_layout(n_features, n_clusters + regions.len());

        let root = BitMapBackend::new(path, (1000, 600)).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Cluster Means vs Regional Averages", ("sans-serif", 30))
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(60)
            .build_cartesian_2d(-0.5f64..(n_features as f64 - 0.5), 0f64..100f64)
            .map_err(render_error)?;

        let names = &comparison.feature_names;
        let feature_label = |x: &f64| {
            let index = x.round();
            if (x - index).abs() < 1e-6 && index >= 0.0 {
                names.get(index as usize).cloned().unwrap_or_default()
            } else {
                String::new()
            }
        };
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(n_features.max(1))
            .x_label_formatter(&feature_label)
            .x_desc("Feature")
            .y_desc("Percent of employees")
            .axis_desc_style(("sans-serif", 15))
            .draw()
            .map_err(render_error)?;

        for cluster in 0..n_clusters {
            let color = cluster_color(cluster);
            chart
                .draw_series((0..n_features).map(|feature| {
                    let (left, right) = layout[feature][cluster];
                    let mean = comparison.cluster_means[[cluster, feature]];
                    Rectangle::new([(left, 0.0), (right, mean)], color.filled())
                }))
                .map_err(render_error)?
                .label(format!("Cluster {cluster}"))
                .legend(move |(x, y)| Rectangle::new([(x, y), (x + 10, y + 10)], color.filled()));
        }

        for (index, region) in regions.iter().enumerate() {
            let color = region_color(index);
            chart
                .draw_series((0..n_features).map(|feature| {
                    let (left, right) = layout[feature][n_clusters + index];
                    Rectangle::new([(left, 0.0), (right, region.means[feature])], color.filled())
                }))
                .map_err(render_error)?
                .label(region.region.clone())
                .legend(move |(x, y)| Rectangle::new([(x, y), (x + 10, y + 10)], color.filled()));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_error)?;

        root.present().map_err(render_error)?;
        tracing::info!(file = %path.display(), "comparison chart saved");
        Ok(())
    }

    fn render_cluster_sizes(&self, model: &ClusterModel, path: &Path) -> Result<()> {
        let cluster_sizes = model.cluster_sizes();
        let max_size = *cluster_sizes.iter().max().unwrap_or(&1) as f64;

        let root = BitMapBackend::new(path, (600, 400)).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Cluster Sizes", ("sans-serif", 30))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(-0.5f64..(model.k as f64 - 0.5), 0f64..(max_size * 1.1))
            .map_err(render_error)?;

        chart
            .configure_mesh()
            .x_desc("Cluster ID")
            .y_desc("Number of Employers")
            .axis_desc_style(("sans-serif", 15))
            .draw()
            .map_err(render_error)?;

        chart
            .draw_series(cluster_sizes.iter().enumerate().map(|(cluster, &size)| {
                Rectangle::new(
                    [(cluster as f64 - 0.4, 0.0), (cluster as f64 + 0.4, size as f64)],
                    cluster_color(cluster).filled(),
                )
            }))
            .map_err(render_error)?;

        root.present().map_err(render_error)?;
        tracing::info!(file = %path.display(), "cluster size chart saved");
        Ok(())
    }

    fn render_clusters(&self, dataset: &Dataset, model: &ClusterModel, path: &Path) -> Result<()> {
        let names = dataset.feature_names();
        if names.len() < 2 {
            return Err(PipelineError::Render(
                "a scatter plot needs at least two features".to_string(),
            ));
        }

        let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("Employer Clusters ({} vs {})", names[0], names[1]),
                ("sans-serif", 30),
            )
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(60)
            .build_cartesian_2d(0f64..100f64, 0f64..100f64)
            .map_err(render_error)?;

        chart
            .configure_mesh()
            .x_desc(names[0].as_str())
            .y_desc(names[1].as_str())
            .axis_desc_style(("sans-serif", 15))
            .draw()
            .map_err(render_error)?;

        chart
            .draw_series(
                dataset
                    .records()
                    .iter()
                    .zip(model.labels.iter())
                    .map(|(record, &cluster)| {
                        Circle::new(
                            (record.values[0], record.values[1]),
                            3,
                            cluster_color(cluster).filled(),
                        )
                    }),
            )
            .map_err(render_error)?;

        // Plot centroids as larger squares
        for (cluster, centroid) in model.centroids.outer_iter().enumerate() {
            let color = cluster_color(cluster);
            let (x, y) = (centroid[0], centroid[1]);
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [(x - 1.0, y - 1.0), (x + 1.0, y + 1.0)],
                    color.filled(),
                )))
                .map_err(render_error)?
                .label(format!("Cluster {cluster} Centroid"))
                .legend(move |(x, y)| Rectangle::new([(x, y), (x + 10, y + 10)], color.filled()));
        }

        chart
            .configure_series_labels()
            .draw()
            .map_err(render_error)?;

        root.present().map_err(render_error)?;
        tracing::info!(file = %path.display(), "cluster scatter plot saved");
        Ok(())
    }

    fn render_descriptive_stats(&self, summaries: &[FeatureSummary], path: &Path) -> Result<()> {
        let n_features = summaries.len();

        let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(
                "Mean Demographic Percentages with Standard Deviation",
                ("sans-serif", 24),
            )
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(60)
            .build_cartesian_2d(
                -0.5f64..(n_features as f64 - 0.5),
                0f64..stats_axis_max(summaries),
            )
            .map_err(render_error)?;

        let feature_label = |x: &f64| {
            let index = x.round();
            if (x - index).abs() < 1e-6 && index >= 0.0 {
                summaries
                    .get(index as usize)
                    .map(|s| s.feature.clone())
                    .unwrap_or_default()
            } else {
                String::new()
            }
        };
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(n_features.max(1))
            .x_label_formatter(&feature_label)
            .y_desc("Percentage (%)")
            .axis_desc_style(("sans-serif", 15))
            .draw()
            .map_err(render_error)?;

        let defined = || {
            summaries
                .iter()
                .enumerate()
                .filter(|(_, s)| s.mean.is_finite())
        };
        chart
            .draw_series(defined().map(|(i, s)| {
                let x = i as f64;
                Rectangle::new([(x - 0.4, 0.0), (x + 0.4, s.mean)], STATS_COLOR.filled())
            }))
            .map_err(render_error)?;
        chart
            .draw_series(defined().filter(|(_, s)| s.std.is_finite()).map(|(i, s)| {
                ErrorBar::new_vertical(
                    i as f64,
                    (s.mean - s.std).max(0.0),
                    s.mean,
                    s.mean + s.std,
                    BLACK.filled(),
                    10,
                )
            }))
            .map_err(render_error)?;

        root.present().map_err(render_error)?;
        tracing::info!(file = %path.display(), "descriptive statistics chart saved");
        Ok(())
    }
}
