//! Data-quality and data-dictionary tables written next to the analysis
//! outputs

use std::cmp::Reverse;
use std::collections::HashMap;

use polars::prelude::*;

use crate::config::ColumnSchema;
use crate::data::{RawDataset, CLUSTER_COLUMN};
use crate::error::{PipelineError, Result};

/// Cell texts read as missing on top of blank cells
const NA_MARKERS: [&str; 9] = ["NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "#N/A", "<NA>"];

fn is_missing(value: Option<&str>) -> bool {
    value.map_or(true, |text| NA_MARKERS.contains(&text))
}

fn frame_error(err: PolarsError) -> PipelineError {
    PipelineError::Schema(err.to_string())
}

/// Missing cells per column of the extracted table: count and percent of rows
pub fn missing_values_summary(raw: &RawDataset) -> Result<DataFrame> {
    let rows = raw.row_count();
    let names = raw.column_names();
    let mut counts = Vec::with_capacity(names.len());
    for name in &names {
        let missing = raw
            .text_column(name)?
            .iter()
            .filter(|value| is_missing(value.as_deref()))
            .count();
        counts.push(missing as u64);
    }
    let percents: Vec<f64> = counts
        .iter()
        .map(|&count| {
            if rows == 0 {
                0.0
            } else {
                count as f64 / rows as f64 * 100.0
            }
        })
        .collect();

    DataFrame::new(vec![
        Column::new("Column".into(), names),
        Column::new("MissingCount".into(), counts),
        Column::new("MissingPercent".into(), percents),
    ])
    .map_err(frame_error)
}

/// Occurrences of each value of `column` over the given raw rows, most
/// frequent first and ties in value order
pub fn value_counts(raw: &RawDataset, column: &str, rows: &[usize]) -> Result<DataFrame> {
    let values = raw.text_column(column)?;
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for value in rows.iter().filter_map(|&row| values.get(row)) {
        if let Some(text) = value.as_deref().filter(|text| !is_missing(Some(*text))) {
            *counts.entry(text).or_default() += 1;
        }
    }

    let mut counts: Vec<(&str, u64)> = counts.into_iter().collect();
    counts.sort_by_key(|&(value, count)| (Reverse(count), value));

    DataFrame::new(vec![
        Column::new(
            column.into(),
            counts.iter().map(|(value, _)| *value).collect::<Vec<&str>>(),
        ),
        Column::new(
            "count".into(),
            counts.iter().map(|(_, count)| *count).collect::<Vec<u64>>(),
        ),
    ])
    .map_err(frame_error)
}

fn describe_column(name: &str, schema: &ColumnSchema) -> String {
    if name == CLUSTER_COLUMN {
        return "KMeans cluster assignment based on demographic percentages".to_string();
    }
    let Some(feature) = schema.features.iter().find(|f| f.name == name) else {
        return format!("Auto-generated column for {name}");
    };
    let group = name.strip_prefix("Pct_").unwrap_or(name);
    match (&feature.count_column, schema.total_columns.first()) {
        (Some(count), Some(total)) => {
            format!("Percentage of {group} employees ({count} / {total} * 100)")
        }
        _ => format!("Percentage of {group} employees"),
    }
}

/// Column name, data type and description for every column of `frame`
pub fn data_dictionary(frame: &DataFrame, schema: &ColumnSchema) -> Result<DataFrame> {
    let columns = frame.get_columns();
    let names: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();
    let dtypes: Vec<String> = columns.iter().map(|c| c.dtype().to_string()).collect();
    let descriptions: Vec<String> = names
        .iter()
        .map(|name| describe_column(name, schema))
        .collect();

    DataFrame::new(vec![
        Column::new("Column Name".into(), names),
        Column::new("Data Type".into(), dtypes),
        Column::new("Description".into(), descriptions),
    ])
    .map_err(frame_error)
}
