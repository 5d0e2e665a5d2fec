use std::fs::File;
use std::path::Path;

use polars::prelude::*;

use crate::error::{ClassifyError, Result};

/// Read a CSV file with all columns as String dtype.
/// Trims whitespace from column names.
pub fn read_csv_as_strings(path: &Path) -> Result<DataFrame> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;
    Ok(df)
}

/// Write a table as CSV or Parquet, chosen by file extension.
pub fn write_table(df: &mut DataFrame, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let mut file = File::create(path)?;
    match extension.as_deref() {
        Some("csv") | None => {
            CsvWriter::new(&mut file).include_header(true).finish(df)?;
        }
        Some("parquet") => {
            ParquetWriter::new(&mut file).finish(df)?;
        }
        Some(other) => {
            return Err(ClassifyError::InvalidData(format!(
                "unsupported output format '.{other}' (expected .csv or .parquet)"
            )))
        }
    }
    Ok(())
}
