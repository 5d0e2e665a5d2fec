//! Conversions between polars columns and plain per-row vectors.
//!
//! Source tables usually arrive with every column as String (see
//! [`crate::io::read_csv_as_strings`]), but typed frames are accepted too:
//! every accessor here works on either representation.

use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::Result;
use crate::model::is_missing_text;

/// Parse a spreadsheet-style number: thousands separators, `$` and spaces
/// are ignored. Anything unparsable or non-finite is `None`.
pub fn to_num(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | ' ' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?;
    let values = match column.dtype() {
        DataType::String => column
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|v| v.and_then(to_num))
            .collect(),
        _ => match column.cast(&DataType::Float64) {
            Ok(cast) => cast
                .as_materialized_series()
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()))
                .collect(),
            Err(_) => vec![None; column.len()],
        },
    };
    Ok(values)
}

/// Like [`numeric_values`], but an unresolved or absent column yields all `None`.
pub fn optional_numeric(df: &DataFrame, name: Option<&str>) -> Result<Vec<Option<f64>>> {
    match name {
        Some(n) if df.schema().contains(n) => numeric_values(df, n),
        _ => Ok(vec![None; df.height()]),
    }
}

/// Trimmed text values. Spreadsheet placeholders ("nan", "None", empty) become `None`.
pub fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name)?;
    let as_text = match column.dtype() {
        DataType::String => column.clone(),
        _ => column.cast(&DataType::String)?,
    };
    let values = as_text
        .as_materialized_series()
        .str()?
        .into_iter()
        .map(|v| {
            v.map(str::trim)
                .filter(|s| !is_missing_text(s))
                .map(str::to_string)
        })
        .collect();
    Ok(values)
}

pub fn optional_strings(df: &DataFrame, name: Option<&str>) -> Result<Vec<Option<String>>> {
    match name {
        Some(n) if df.schema().contains(n) => string_values(df, n),
        _ => Ok(vec![None; df.height()]),
    }
}

/// Join keys compare as trimmed text, with integral floats (`"12.0"`) folded to `"12"`.
pub fn normalize_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if is_missing_text(trimmed) {
        return None;
    }
    match trimmed.strip_suffix(".0") {
        Some(int_part) if !int_part.is_empty() && int_part.chars().all(|c| c.is_ascii_digit()) => {
            Some(int_part.to_string())
        }
        _ => Some(trimmed.to_string()),
    }
}

pub fn key_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    Ok(string_values(df, name)?
        .into_iter()
        .map(|v| v.and_then(|s| normalize_key(&s)))
        .collect())
}

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y", "%m/%d/%Y"];

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    // Datetime strings: keep the date part.
    let head = trimmed.split(|c| c == ' ' || c == 'T').next()?;
    if head.len() < trimmed.len() {
        return parse_date(head);
    }
    None
}

pub fn date_values(df: &DataFrame, name: Option<&str>) -> Result<Vec<Option<NaiveDate>>> {
    Ok(optional_strings(df, name)?
        .into_iter()
        .map(|v| v.and_then(|s| parse_date(&s)))
        .collect())
}

/// Add a column, replacing any existing column of the same name.
pub fn upsert(df: &mut DataFrame, column: Column) -> Result<()> {
    df.with_column(column)?;
    Ok(())
}

pub fn float_column(name: &str, values: &[Option<f64>]) -> Column {
    let cleaned: Vec<Option<f64>> = values
        .iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();
    Column::new(name.into(), cleaned)
}

pub fn text_column<S: AsRef<str>>(name: &str, values: &[Option<S>]) -> Column {
    let values: Vec<Option<&str>> = values.iter().map(|v| v.as_ref().map(|s| s.as_ref())).collect();
    Column::new(name.into(), values)
}
