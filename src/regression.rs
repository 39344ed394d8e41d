//! Ordinary least-squares regression of one feature on others or on region

use linfa::traits::{Fit, Predict};
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2};

use crate::config::RegressionSpec;
use crate::data::Dataset;
use crate::error::{PipelineError, Result};

/// Fitted linear model
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionModel {
    pub target: String,
    /// Design column names; region indicators are named `<region column>=<level>`
    pub predictor_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Coefficient of determination on the fitted rows; `None` when the
    /// target has zero variance
    pub r2: Option<f64>,
    /// Rows the model was fitted on
    pub n_rows: usize,
}

impl RegressionModel {
    pub fn predict_row(&self, design_row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(design_row)
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }
}

enum Predictor {
    Feature(usize),
    /// One indicator per non-baseline region level
    Region(Vec<String>),
}

/// Design matrix, target vector and column names
struct Design {
    names: Vec<String>,
    x: Array2<f64>,
    y: Array1<f64>,
}

fn build_design(dataset: &Dataset, spec: &RegressionSpec, region_column: &str) -> Result<Design> {
    let target = dataset.feature_index(&spec.target).ok_or_else(|| {
        PipelineError::Schema(format!("regression target '{}' is not a feature", spec.target))
    })?;
    let uses_region = spec.predictors.iter().any(|p| p == region_column);

    // Region indicators need a region on every fitted row
    let rows: Vec<_> = dataset
        .records()
        .iter()
        .filter(|record| !uses_region || record.region.is_some())
        .collect();
    let levels: Vec<String> = rows
        .iter()
        .filter_map(|record| record.region.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut predictors = Vec::with_capacity(spec.predictors.len());
    let mut names = Vec::new();
    for name in &spec.predictors {
        if name == region_column {
            // First level is the baseline
            let indicators: Vec<String> = levels.iter().skip(1).cloned().collect();
            names.extend(indicators.iter().map(|level| format!("{region_column}={level}")));
            predictors.push(Predictor::Region(indicators));
        } else {
            let index = dataset.feature_index(name).ok_or_else(|| {
                PipelineError::Schema(format!("regression predictor '{name}' is not a feature"))
            })?;
            if index == target {
                return Err(PipelineError::Schema(format!(
                    "'{name}' cannot be both target and predictor"
                )));
            }
            names.push(name.clone());
            predictors.push(Predictor::Feature(index));
        }
    }

    if names.is_empty() {
        return Err(PipelineError::Schema(format!(
            "no predictor columns: '{region_column}' has {} distinct level(s)",
            levels.len()
        )));
    }
    if rows.len() <= names.len() {
        return Err(PipelineError::InsufficientData(format!(
            "{} rows for {} predictors",
            rows.len(),
            names.len()
        )));
    }

    let mut x = Array2::<f64>::zeros((rows.len(), names.len()));
    for (i, record) in rows.iter().enumerate() {
        let mut col = 0;
        for predictor in &predictors {
            match predictor {
                Predictor::Feature(index) => {
                    x[[i, col]] = record.values[*index];
                    col += 1;
                }
                Predictor::Region(indicators) => {
                    for level in indicators {
                        if record.region.as_deref() == Some(level.as_str()) {
                            x[[i, col]] = 1.0;
                        }
                        col += 1;
                    }
                }
            }
        }
    }
    let y = rows.iter().map(|record| record.values[target]).collect();

    Ok(Design { names, x, y })
}

/// R² = 1 - SS_res / SS_tot; `None` when SS_tot is zero
pub fn r2_score(targets: &Array1<f64>, predictions: &Array1<f64>) -> Option<f64> {
    let mean = targets.mean()?;
    let ss_tot: f64 = targets.iter().map(|y| (y - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return None;
    }
    let ss_res: f64 = targets
        .iter()
        .zip(predictions.iter())
        .map(|(y, y_hat)| (y - y_hat).powi(2))
        .sum();
    Some(1.0 - ss_res / ss_tot)
}

/// Fit `spec.target` on `spec.predictors` with an intercept
///
/// # Errors
/// * `Schema` for unknown columns or when no predictor column remains
/// * `InsufficientData` when rows do not exceed the number of predictors
/// * `Regression` when the least-squares solve fails
pub fn fit_regression(
    dataset: &Dataset,
    spec: &RegressionSpec,
    region_column: &str,
) -> Result<RegressionModel> {
    let Design { names, x, y } = build_design(dataset, spec, region_column)?;
    let n_rows = x.nrows();

    let training = linfa::Dataset::new(x.clone(), y.clone());
    let fitted = LinearRegression::new()
        .fit(&training)
        .map_err(|e| PipelineError::Regression(e.to_string()))?;

    let predictions: Array1<f64> = fitted.predict(&x);
    let coefficients = fitted.params().to_vec();
    if coefficients.iter().any(|c| !c.is_finite()) || !fitted.intercept().is_finite() {
        return Err(PipelineError::Regression(
            "least-squares solution is not finite; predictors are collinear".to_string(),
        ));
    }
    let r2 = r2_score(&y, &predictions);

    tracing::debug!(target = %spec.target, predictors = ?names, ?r2, "regression fitted");

    Ok(RegressionModel {
        target: spec.target.clone(),
        predictor_names: names,
        coefficients,
        intercept: fitted.intercept(),
        r2,
        n_rows,
    })
}
