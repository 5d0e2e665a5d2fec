use std::collections::BTreeSet;

use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::RegressionConfig;
use crate::detect::{Field, SchemaMap};
use crate::error::Result;
use crate::forest::{ForestParams, RandomForest};
use crate::frame;
use crate::model::SalesMetrics;
use crate::schema::{anomaly, features};
use crate::stats;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Outcome of the months-to-sell-out regression. Diagnostic only: nothing
/// here flows back into the classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionReport {
    pub training_rows: usize,
    pub training_mae: f64,
    pub importances: Vec<FeatureImportance>,
}

const MIN_COVERAGE: f64 = 0.5;

/// Named feature matrix for every row of the table.
struct FeatureMatrix {
    names: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
}

fn numeric_candidates(df: &DataFrame) -> Result<FeatureMatrix> {
    let mut names = Vec::new();
    let mut columns = Vec::new();
    let n = df.height().max(1) as f64;
    for column in df.get_columns() {
        let name = column.name().as_str();
        if !name.starts_with('_') || name == anomaly::IS_ANOMALY {
            continue;
        }
        let dtype = column.dtype();
        if !(dtype.is_float() || dtype.is_integer()) {
            continue;
        }
        let values = frame::numeric_values(df, name)?;
        let coverage = values.iter().filter(|v| v.is_some()).count() as f64 / n;
        if coverage > MIN_COVERAGE {
            names.push(name.to_string());
            columns.push(values);
        }
    }
    Ok(FeatureMatrix { names, columns })
}

fn one_hot(df: &DataFrame, column: &str, matrix: &mut FeatureMatrix) -> Result<()> {
    let values = frame::string_values(df, column)?;
    let levels: BTreeSet<&str> = values.iter().flatten().map(String::as_str).collect();
    for level in levels {
        let indicator = values
            .iter()
            .map(|v| Some(if v.as_deref() == Some(level) { 1.0 } else { 0.0 }))
            .collect();
        matrix.names.push(format!("{column}={level}"));
        matrix.columns.push(indicator);
    }
    Ok(())
}

/// Train the diagnostic ensemble on unflagged rows with a valid target.
/// Returns `None` when disabled or when there is too little clean data.
pub fn diagnose(
    df: &DataFrame,
    sources: &SchemaMap,
    metrics: &[SalesMetrics],
    flags: &[bool],
    max_months: f64,
    config: &RegressionConfig,
) -> Result<Option<RegressionReport>> {
    if !config.enabled {
        return Ok(None);
    }

    let train: Vec<usize> = (0..df.height())
        .filter(|&i| !flags[i] && metrics[i].has_valid_sellout(max_months))
        .collect();
    if train.len() < config.min_rows {
        info!(
            "Regression diagnostic skipped: {} clean rows, {} required",
            train.len(),
            config.min_rows
        );
        return Ok(None);
    }

    let mut matrix = numeric_candidates(df)?;
    let categorical = [sources.get(Field::Zone), sources.get(Field::Stratum)]
        .into_iter()
        .flatten()
        .chain(features::CATEGORICAL);
    for column in categorical {
        if df.schema().contains(column) {
            one_hot(df, column, &mut matrix)?;
        }
    }
    if matrix.names.is_empty() {
        info!("Regression diagnostic skipped: no usable features");
        return Ok(None);
    }

    // missing values take the training median of their column
    let fills: Vec<f64> = matrix
        .columns
        .iter()
        .map(|col| {
            let present: Vec<f64> = train.iter().filter_map(|&i| col[i]).collect();
            stats::median(&present).unwrap_or(0.0)
        })
        .collect();
    let x: Vec<Vec<f64>> = train
        .iter()
        .map(|&i| {
            matrix
                .columns
                .iter()
                .zip(&fills)
                .map(|(col, fill)| col[i].unwrap_or(*fill))
                .collect()
        })
        .collect();
    let y: Vec<f64> = train
        .iter()
        .filter_map(|&i| metrics[i].months_to_sellout)
        .collect();

    let params = ForestParams {
        n_trees: config.n_trees,
        max_depth: config.max_depth,
        min_samples_split: config.min_samples_split,
        min_samples_leaf: config.min_samples_leaf,
        seed: config.seed,
    };
    let forest = RandomForest::fit(&x, &y, &params);

    let mae = x
        .iter()
        .zip(&y)
        .map(|(row, target)| (forest.predict(row) - target).abs())
        .sum::<f64>()
        / y.len() as f64;

    let mut importances: Vec<FeatureImportance> = matrix
        .names
        .into_iter()
        .zip(forest.feature_importances())
        .map(|(feature, importance)| FeatureImportance {
            feature,
            importance: *importance,
        })
        .collect();
    importances.sort_by(|a, b| {
        b.importance
            .total_cmp(&a.importance)
            .then_with(|| a.feature.cmp(&b.feature))
    });

    for fi in importances.iter().take(5) {
        debug!("importance {:>6.3}  {}", fi.importance, fi.feature);
    }
    info!(
        "Regression diagnostic trained on {} rows over {} features (MAE {:.2} months)",
        y.len(),
        importances.len(),
        mae
    );

    Ok(Some(RegressionReport {
        training_rows: y.len(),
        training_mae: mae,
        importances,
    }))
}
