//! Cleaning of the extracted table into numeric percentage features

use std::collections::HashSet;

use crate::config::ColumnSchema;
use crate::data::{Dataset, RawDataset, Record};
use crate::error::{PipelineError, Result};

/// Row accounting for one transform run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub dropped_duplicates: usize,
    pub dropped_missing: usize,
    pub dropped_out_of_range: usize,
}

impl TransformReport {
    pub fn dropped(&self) -> usize {
        self.dropped_duplicates + self.dropped_missing + self.dropped_out_of_range
    }
}

#[derive(Debug)]
pub struct TransformOutput {
    pub dataset: Dataset,
    pub report: TransformReport,
}

/// Where a feature's values come from
enum FeatureSource {
    Percentage(Vec<Option<String>>),
    Derived {
        counts: Vec<Option<String>>,
        totals: Vec<Option<String>>,
    },
}

impl FeatureSource {
    fn value(&self, row: usize) -> Option<f64> {
        match self {
            FeatureSource::Percentage(values) => values[row].as_deref().and_then(parse_number),
            FeatureSource::Derived { counts, totals } => {
                let count = counts[row].as_deref().and_then(parse_number)?;
                let total = totals[row].as_deref().and_then(parse_number)?;
                if total > 0.0 {
                    Some(count / total * 100.0)
                } else {
                    None
                }
            }
        }
    }
}

/// Parse a numeric cell, tolerating a trailing percent sign.
///
/// `NaN` and infinities count as missing, like any other NA marker.
fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    let text = text.strip_suffix('%').unwrap_or(text).trim_end();
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn resolve_sources(raw: &RawDataset, schema: &ColumnSchema) -> Result<Vec<FeatureSource>> {
    let total_column = schema
        .total_columns
        .iter()
        .find(|column| raw.has_column(column));

    schema
        .features
        .iter()
        .map(|feature| {
            if raw.has_column(&feature.name) {
                return Ok(FeatureSource::Percentage(raw.text_column(&feature.name)?));
            }
            match (&feature.count_column, total_column) {
                (Some(count), Some(total)) if raw.has_column(count) => {
                    tracing::debug!(
                        feature = %feature.name,
                        "deriving from {count} / {total}"
                    );
                    Ok(FeatureSource::Derived {
                        counts: raw.text_column(count)?,
                        totals: raw.text_column(total)?,
                    })
                }
                _ => Err(PipelineError::Schema(format!(
                    "required column '{}' is missing and cannot be derived",
                    feature.name
                ))),
            }
        })
        .collect()
}

/// Clean the raw table into a dataset of in-range percentage features
///
/// Rows are dropped, never patched: exact duplicates, rows with a missing
/// or unparseable feature, and rows with a feature outside [0, 100].
pub fn transform_dataset(raw: &RawDataset, schema: &ColumnSchema) -> Result<TransformOutput> {
    let input_rows = raw.row_count();
    tracing::info!(rows = input_rows, file = %raw.file_name(), "transforming dataset");

    let sources = resolve_sources(raw, schema)?;

    let all_columns = raw
        .column_names()
        .iter()
        .map(|name| raw.text_column(name))
        .collect::<Result<Vec<_>>>()?;
    let ids = if raw.has_column(&schema.id_column) {
        Some(raw.text_column(&schema.id_column)?)
    } else {
        None
    };
    let regions = if raw.has_column(&schema.region_column) {
        Some(raw.text_column(&schema.region_column)?)
    } else {
        tracing::warn!(column = %schema.region_column, "region column absent");
        None
    };

    let mut report = TransformReport {
        input_rows,
        ..TransformReport::default()
    };
    let mut seen = HashSet::with_capacity(input_rows);
    let mut records = Vec::with_capacity(input_rows);

    for row in 0..input_rows {
        let key: Vec<Option<&str>> = all_columns
            .iter()
            .map(|column| column[row].as_deref())
            .collect();
        if !seen.insert(key) {
            report.dropped_duplicates += 1;
            continue;
        }

        let Some(values) = sources
            .iter()
            .map(|source| source.value(row))
            .collect::<Option<Vec<f64>>>()
        else {
            report.dropped_missing += 1;
            continue;
        };

        if values
            .iter()
            .any(|value| !(0.0..=100.0).contains(value))
        {
            report.dropped_out_of_range += 1;
            continue;
        }

        let employer_id = ids
            .as_ref()
            .and_then(|ids| ids[row].clone())
            .unwrap_or_else(|| (row + 1).to_string());
        let region = regions.as_ref().and_then(|regions| regions[row].clone());

        records.push(Record {
            employer_id,
            region,
            values,
            source_row: row,
        });
    }

    report.output_rows = records.len();
    tracing::info!(
        before = report.input_rows,
        after = report.output_rows,
        duplicates = report.dropped_duplicates,
        missing = report.dropped_missing,
        out_of_range = report.dropped_out_of_range,
        "transform complete"
    );

    let dataset = Dataset::new(schema.feature_names(), records)?;
    Ok(TransformOutput { dataset, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureColumn;
    use polars::prelude::*;
    use std::path::PathBuf;

    fn raw_from(columns: Vec<(&str, Vec<Option<&str>>)>) -> RawDataset {
        let columns = columns
            .into_iter()
            .map(|(name, values)| Column::new(name.into(), values))
            .collect();
        RawDataset {
            path: PathBuf::from("transformed_test.csv"),
            frame: DataFrame::new(columns).unwrap(),
        }
    }

    fn two_feature_schema() -> ColumnSchema {
        ColumnSchema {
            features: vec![
                FeatureColumn::new("Pct_White", Some("WHT10")),
                FeatureColumn::new("Pct_Black", Some("BLKT10")),
            ],
            ..ColumnSchema::default()
        }
    }

    #[test]
    fn test_out_of_range_and_missing_rows_are_dropped_and_counted() {
        let raw = raw_from(vec![
            ("Employer_ID", vec![Some("a"), Some("b"), Some("c"), Some("d"), Some("e")]),
            ("Region", vec![Some("West"), Some("South"), Some(" West "), None, Some("West")]),
            ("Pct_White", vec![Some("50"), Some("120"), Some("30.5"), Some("n/a"), Some("10%")]),
            ("Pct_Black", vec![Some("20"), Some("10"), Some("-1"), Some("5"), Some("0")]),
        ]);

        let output = transform_dataset(&raw, &two_feature_schema()).unwrap();
        let report = output.report;
        assert_eq!(report.input_rows, 5);
        assert_eq!(report.output_rows, 2);
        assert_eq!(report.dropped_out_of_range, 2);
        assert_eq!(report.dropped_missing, 1);
        assert_eq!(report.dropped(), 3);

        for record in output.dataset.records() {
            assert!(record.values.iter().all(|v| (0.0..=100.0).contains(v)));
        }
        let ids: Vec<&str> = output
            .dataset
            .records()
            .iter()
            .map(|r| r.employer_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "e"]);
        assert_eq!(output.dataset.records()[1].values, vec![10.0, 0.0]);
    }

    #[test]
    fn test_percentages_derived_from_headcounts() {
        let raw = raw_from(vec![
            ("Region", vec![Some("West"), Some("South"), Some("East")]),
            ("TOTAL10", vec![Some("200"), Some("0"), Some("50")]),
            ("WHT10", vec![Some("150"), Some("0"), Some("10")]),
            ("BLKT10", vec![Some("50"), Some("0"), Some("5")]),
        ]);

        let output = transform_dataset(&raw, &two_feature_schema()).unwrap();
        assert_eq!(output.report.dropped_missing, 1);

        let records = output.dataset.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].values, vec![75.0, 25.0]);
        assert_eq!(records[1].values, vec![20.0, 10.0]);
        // No id column: fall back to the 1-based row number
        assert_eq!(records[1].employer_id, "3");
        assert_eq!(records[1].source_row, 2);
    }

    #[test]
    fn test_duplicates_dropped_after_trimming() {
        let raw = raw_from(vec![
            ("Region", vec![Some("West"), Some(" West"), Some("South")]),
            ("Pct_White", vec![Some("40"), Some("40"), Some("40")]),
            ("Pct_Black", vec![Some("10"), Some("10 "), Some("10")]),
        ]);

        let output = transform_dataset(&raw, &two_feature_schema()).unwrap();
        assert_eq!(output.report.dropped_duplicates, 1);
        assert_eq!(output.dataset.len(), 2);
    }

    #[test]
    fn test_missing_required_column_is_schema_error() {
        let raw = raw_from(vec![
            ("Region", vec![Some("West")]),
            ("Pct_White", vec![Some("40")]),
        ]);

        let err = transform_dataset(&raw, &two_feature_schema()).unwrap_err();
        match err {
            PipelineError::Schema(message) => assert!(message.contains("Pct_Black")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 12.5 "), Some(12.5));
        assert_eq!(parse_number("40 %"), Some(40.0));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("-inf"), None);
    }

    #[test]
    fn test_nan_cells_count_as_missing() {
        let raw = raw_from(vec![
            ("Pct_White", vec![Some("NaN"), Some("NA"), Some("inf"), Some("40")]),
            ("Pct_Black", vec![Some("10"), Some("10"), Some("10"), Some("10")]),
        ]);

        let report = transform_dataset(&raw, &two_feature_schema()).unwrap().report;
        assert_eq!(report.dropped_missing, 3);
        assert_eq!(report.dropped_out_of_range, 0);
        assert_eq!(report.output_rows, 1);
    }
}
