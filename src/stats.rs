//! Descriptive statistics of the cleaned feature columns

use polars::prelude::*;

use crate::data::Dataset;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSummary {
    pub feature: String,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; NaN with fewer than two values
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

pub fn describe(dataset: &Dataset) -> Vec<FeatureSummary> {
    dataset
        .feature_names()
        .iter()
        .map(|feature| {
            let values = dataset.feature_values(feature).unwrap_or_default();
            summarize(feature, &values)
        })
        .collect()
}

fn summarize(feature: &str, values: &[f64]) -> FeatureSummary {
    let count = values.len();
    let mean = if count == 0 {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / count as f64
    };
    let std = if count < 2 {
        f64::NAN
    } else {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (count - 1) as f64).sqrt()
    };
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    FeatureSummary {
        feature: feature.to_string(),
        count,
        mean,
        std,
        min: if count == 0 { f64::NAN } else { min },
        max: if count == 0 { f64::NAN } else { max },
    }
}

/// One row per feature: feature, count, mean, std, min, max
pub fn summary_frame(summaries: &[FeatureSummary]) -> Result<DataFrame> {
    let column = |name: &str, f: fn(&FeatureSummary) -> f64| {
        Column::new(name.into(), summaries.iter().map(f).collect::<Vec<f64>>())
    };
    DataFrame::new(vec![
        Column::new(
            "feature".into(),
            summaries
                .iter()
                .map(|s| s.feature.clone())
                .collect::<Vec<String>>(),
        ),
        Column::new(
            "count".into(),
            summaries.iter().map(|s| s.count as u64).collect::<Vec<u64>>(),
        ),
        column("mean", |s| s.mean),
        column("std", |s| s.std),
        column("min", |s| s.min),
        column("max", |s| s.max),
    ])
    .map_err(|e| PipelineError::Schema(e.to_string()))
}
