use polars::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::frame;
use crate::model::{SalesPattern, Tier};
use crate::schema::output;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub rows: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn count_where<F: Fn(f64) -> bool>(values: &[Option<f64>], pred: F) -> usize {
    values.iter().flatten().filter(|v| pred(**v)).count()
}

/// Check a classified table against the output invariants. Errors mean
/// the table breaks a contract; warnings flag suspicious data.
pub fn check(table: &DataFrame) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        rows: table.height(),
        ..ValidationReport::default()
    };
    let schema = table.schema();

    let missing: Vec<&str> = output::ALL
        .iter()
        .copied()
        .filter(|c| !schema.contains(c))
        .collect();
    if !missing.is_empty() {
        report
            .errors
            .push(format!("missing canonical columns: {}", missing.join(", ")));
    }

    if schema.contains(output::TIER) {
        let invalid = frame::string_values(table, output::TIER)?
            .iter()
            .filter(|t| t.as_deref().and_then(Tier::parse).is_none())
            .count();
        if invalid > 0 {
            report.errors.push(format!("{invalid} rows with an invalid tier"));
        }
    }

    if let Some(dtype) = schema.get(output::SCORE) {
        if !dtype.is_float() {
            report
                .warnings
                .push(format!("{} has dtype {dtype}, expected Float64", output::SCORE));
        }
        let scores = frame::numeric_values(table, output::SCORE)?;
        let outside = scores
            .iter()
            .filter(|s| !matches!(s, Some(v) if (0.0..=1.0).contains(v)))
            .count();
        if outside > 0 {
            report
                .errors
                .push(format!("{outside} rows with a score outside [0, 1]"));
        }
    }

    for column in [output::VELOCITY, output::UNITS_SOLD, output::UNITS_AVAILABLE] {
        if schema.contains(column) {
            let negative = count_where(&frame::numeric_values(table, column)?, |v| v < 0.0);
            if negative > 0 {
                report.errors.push(format!("{negative} negative values in {column}"));
            }
        }
    }

    if schema.contains(output::MONTHS_TO_SELLOUT) {
        let values = frame::numeric_values(table, output::MONTHS_TO_SELLOUT)?;
        let outside = count_where(&values, |v| !(0.0..=120.0).contains(&v));
        if outside > 0 {
            report
                .errors
                .push(format!("{outside} rows with months to sell out outside [0, 120]"));
        }
    }

    if schema.contains(output::PATTERN) {
        let unknown = frame::string_values(table, output::PATTERN)?
            .iter()
            .filter(|p| p.as_deref().and_then(SalesPattern::parse).is_none())
            .count();
        if unknown > 0 {
            report.warnings.push(format!("{unknown} rows with an unknown sales pattern"));
        }
    }

    for column in [output::AVG_PRICE, output::AVG_AREA] {
        if schema.contains(column) {
            let negative = count_where(&frame::numeric_values(table, column)?, |v| v < 0.0);
            if negative > 0 {
                report.warnings.push(format!("{negative} negative values in {column}"));
            }
        }
    }

    for e in &report.errors {
        warn!("validation error: {}", e);
    }
    for w in &report.warnings {
        warn!("validation warning: {}", w);
    }
    info!(
        "Validated {} rows: {} errors, {} warnings",
        report.rows,
        report.errors.len(),
        report.warnings.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_are_errors() {
        let df = df!(output::TIER => ["Exitoso"]).unwrap();
        let report = check(&df).unwrap();
        assert!(!report.is_valid());
        assert!(report.errors[0].contains(output::CODE));
    }

    #[test]
    fn bad_values_are_reported() {
        let df = df!(
            output::TIER => ["Exitoso", "Otro"],
            output::SCORE => [0.7, 1.4],
            output::VELOCITY => [-1.0, 2.0],
            output::PATTERN => ["Acelerado", "Rapido"],
        )
        .unwrap();
        let report = check(&df).unwrap();
        assert!(report.errors.iter().any(|e| e.contains("invalid tier")));
        assert!(report.errors.iter().any(|e| e.contains("outside [0, 1]")));
        assert!(report.errors.iter().any(|e| e.contains(output::VELOCITY)));
        assert!(report.warnings.iter().any(|w| w.contains("sales pattern")));
    }
}
