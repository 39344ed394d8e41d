//! Comparison of cluster profiles against regional reference averages

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use ndarray::Array2;
use polars::prelude::*;

use crate::data::{read_csv, Dataset};
use crate::error::{PipelineError, Result};
use crate::model::ClusterModel;

/// Mean feature values of one region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionAverage {
    pub region: String,
    pub means: Vec<f64>,
}

/// Regional averages the clusters are compared against
#[derive(Debug, Clone, PartialEq)]
pub struct RegionalReference {
    pub feature_names: Vec<String>,
    pub rows: Vec<RegionAverage>,
}

impl RegionalReference {
    /// Per-region feature means of the dataset, regions sorted
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let n_features = dataset.feature_names().len();
        let mut totals: BTreeMap<&str, (Vec<f64>, usize)> = BTreeMap::new();
        for record in dataset.records() {
            let Some(region) = record.region.as_deref() else {
                continue;
            };
            let (sums, count) = totals
                .entry(region)
                .or_insert_with(|| (vec![0.0; n_features], 0));
            for (sum, value) in sums.iter_mut().zip(&record.values) {
                *sum += value;
            }
            *count += 1;
        }

        let rows = totals
            .into_iter()
            .map(|(region, (sums, count))| RegionAverage {
                region: region.to_string(),
                means: sums.into_iter().map(|sum| sum / count as f64).collect(),
            })
            .collect();

        Self {
            feature_names: dataset.feature_names().to_vec(),
            rows,
        }
    }

    /// Load a static reference CSV: a region column plus one column per feature
    pub fn load(path: &Path, region_column: &str) -> Result<Self> {
        let frame = read_csv(path)?;
        let format_error = |message: String| PipelineError::Format {
            path: path.to_path_buf(),
            message,
        };
        let text = |name: &str| -> Result<Vec<Option<String>>> {
            let series = frame
                .column(name)
                .map_err(|e| format_error(e.to_string()))?
                .as_materialized_series()
                .cast(&DataType::String)
                .map_err(|e| format_error(e.to_string()))?;
            let values = series
                .str()
                .map_err(|e| format_error(e.to_string()))?
                .into_iter()
                .map(|value| value.map(|v| v.trim().to_string()))
                .collect();
            Ok(values)
        };

        let names: Vec<String> = frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        if !names.iter().any(|name| name == region_column) {
            return Err(PipelineError::Alignment(format!(
                "reference table {} has no '{region_column}' column",
                path.display()
            )));
        }
        let feature_names: Vec<String> = names
            .into_iter()
            .filter(|name| name != region_column)
            .collect();

        let regions = text(region_column)?;
        let columns = feature_names
            .iter()
            .map(|name| text(name))
            .collect::<Result<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(regions.len());
        for (row, region) in regions.into_iter().enumerate() {
            let region = region
                .filter(|region| !region.is_empty())
                .ok_or_else(|| format_error(format!("row {} has no region", row + 1)))?;
            let means = columns
                .iter()
                .zip(&feature_names)
                .map(|(column, name)| {
                    column[row]
                        .as_deref()
                        .and_then(|value| value.parse::<f64>().ok())
                        .ok_or_else(|| {
                            format_error(format!("row {} has no numeric '{name}'", row + 1))
                        })
                })
                .collect::<Result<Vec<f64>>>()?;
            rows.push(RegionAverage { region, means });
        }

        Ok(Self {
            feature_names,
            rows,
        })
    }

    /// Same table with features in `order`
    ///
    /// # Errors
    /// * `Alignment` when the feature sets differ or the table is empty
    pub fn aligned_to(&self, order: &[String]) -> Result<Self> {
        let ours: BTreeSet<&String> = order.iter().collect();
        let theirs: BTreeSet<&String> = self.feature_names.iter().collect();
        if ours != theirs || order.len() != self.feature_names.len() {
            let missing: Vec<&&String> = ours.difference(&theirs).collect();
            let extra: Vec<&&String> = theirs.difference(&ours).collect();
            return Err(PipelineError::Alignment(format!(
                "reference columns do not match cluster features (missing: {missing:?}, unexpected: {extra:?})"
            )));
        }
        if self.rows.is_empty() {
            return Err(PipelineError::Alignment(
                "reference table has no regions".to_string(),
            ));
        }

        let positions: Vec<usize> = order
            .iter()
            .filter_map(|name| self.feature_names.iter().position(|f| f == name))
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| RegionAverage {
                region: row.region.clone(),
                means: positions.iter().map(|&p| row.means[p]).collect(),
            })
            .collect();

        Ok(Self {
            feature_names: order.to_vec(),
            rows,
        })
    }

    pub fn to_frame(&self, region_column: &str) -> Result<DataFrame> {
        let mut columns = vec![Column::new(
            region_column.into(),
            self.rows
                .iter()
                .map(|row| row.region.clone())
                .collect::<Vec<String>>(),
        )];
        for (index, name) in self.feature_names.iter().enumerate() {
            let values: Vec<f64> = self.rows.iter().map(|row| row.means[index]).collect();
            columns.push(Column::new(name.as_str().into(), values));
        }
        DataFrame::new(columns).map_err(|e| PipelineError::Schema(e.to_string()))
    }
}

/// One cluster against one region
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub cluster: usize,
    pub region: String,
    pub cluster_means: Vec<f64>,
    pub region_means: Vec<f64>,
}

impl ComparisonRow {
    /// Cluster mean minus regional mean, per feature
    pub fn differences(&self) -> Vec<f64> {
        self.cluster_means
            .iter()
            .zip(&self.region_means)
            .map(|(c, r)| c - r)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub feature_names: Vec<String>,
    pub cluster_sizes: Vec<usize>,
    /// Shape (clusters, features)
    pub cluster_means: Array2<f64>,
    pub reference: RegionalReference,
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonResult {
    /// Columns: Cluster, Cluster_Size, region, then `<f>_cluster`,
    /// `<f>_region`, `<f>_diff` for every feature
    pub fn to_frame(&self, region_column: &str) -> Result<DataFrame> {
        let mut columns = vec![
            Column::new(
                "Cluster".into(),
                self.rows.iter().map(|r| r.cluster as u32).collect::<Vec<u32>>(),
            ),
            Column::new(
                "Cluster_Size".into(),
                self.rows
                    .iter()
                    .map(|r| self.cluster_sizes[r.cluster] as u64)
                    .collect::<Vec<u64>>(),
            ),
            Column::new(
                region_column.into(),
                self.rows.iter().map(|r| r.region.clone()).collect::<Vec<String>>(),
            ),
        ];
        for (index, name) in self.feature_names.iter().enumerate() {
            let pick = |f: &dyn Fn(&ComparisonRow) -> f64| -> Vec<f64> {
                self.rows.iter().map(f).collect()
            };
            columns.push(Column::new(
                format!("{name}_cluster").into(),
                pick(&|r: &ComparisonRow| r.cluster_means[index]),
            ));
            columns.push(Column::new(
                format!("{name}_region").into(),
                pick(&|r: &ComparisonRow| r.region_means[index]),
            ));
            columns.push(Column::new(
                format!("{name}_diff").into(),
                pick(&|r: &ComparisonRow| r.cluster_means[index] - r.region_means[index]),
            ));
        }
        DataFrame::new(columns).map_err(|e| PipelineError::Schema(e.to_string()))
    }
}

/// Join per-cluster feature means with the regional reference
pub fn compare_clusters(
    dataset: &Dataset,
    model: &ClusterModel,
    reference: &RegionalReference,
) -> Result<ComparisonResult> {
    let reference = reference.aligned_to(dataset.feature_names())?;
    let cluster_means = model.cluster_means(dataset);
    let cluster_sizes = model.cluster_sizes();

    let rows = (0..model.k)
        .flat_map(|cluster| {
            let cluster_row = cluster_means.row(cluster).to_vec();
            reference.rows.iter().map(move |region| ComparisonRow {
                cluster,
                region: region.region.clone(),
                cluster_means: cluster_row.clone(),
                region_means: region.means.clone(),
            })
        })
        .collect::<Vec<_>>();

    tracing::info!(
        clusters = model.k,
        regions = reference.rows.len(),
        "cluster/region comparison built"
    );

    Ok(ComparisonResult {
        feature_names: dataset.feature_names().to_vec(),
        cluster_sizes,
        cluster_means,
        reference,
        rows,
    })
}
