use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use polars::prelude::*;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3_polars::PyDataFrame;

use crate::cohort::{self, StatusFilter};
use crate::config::EngineConfig;
use crate::error::ClassifyError;
use crate::io;
use crate::pipeline::{ClassificationRun, Engine};
use crate::validate;

fn to_json<T: serde::Serialize>(value: &T) -> PyResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| PyValueError::new_err(e.to_string()))
}

#[pyclass]
pub struct Classifier {
    base_path: PathBuf,
    engine: Engine,
    last_run: Option<ClassificationRun>,
}

#[pymethods]
impl Classifier {
    #[new]
    #[pyo3(signature = (base_path, config=None, as_of=None))]
    fn new(base_path: String, config: Option<String>, as_of: Option<NaiveDate>) -> PyResult<Self> {
        let config = EngineConfig::load(config.as_deref().map(std::path::Path::new))?;
        let mut engine = Engine::new(config);
        if let Some(date) = as_of {
            engine = engine.with_as_of(date);
        }
        Ok(Self {
            base_path: PathBuf::from(base_path),
            engine,
            last_run: None,
        })
    }

    /// Load any CSV into a Polars DataFrame with all columns as strings.
    /// Optionally rename columns via a map.
    #[pyo3(signature = (filename, rename=None))]
    fn load_csv(&self, filename: &str, rename: Option<HashMap<String, String>>) -> PyResult<PyDataFrame> {
        let mut df = io::read_csv_as_strings(&self.base_path.join(filename))?;
        if let Some(map) = rename {
            let old: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
            let new: Vec<&str> = map.values().map(|s| s.as_str()).collect();
            df = df
                .lazy()
                .rename(old, new, true)
                .collect()
                .map_err(ClassifyError::from)?;
        }
        Ok(PyDataFrame(df))
    }

    /// Classify projects from a unit table and a project table.
    /// Returns one row per project; the run is kept for the analytics calls.
    fn classify(&mut self, units: PyDataFrame, projects: PyDataFrame) -> PyResult<PyDataFrame> {
        let run = self.engine.classify(&units.0, &projects.0)?;
        let table = run.table.clone();
        self.last_run = Some(run);
        Ok(PyDataFrame(table))
    }

    /// Profile of the Exitoso cohort from the last run, as JSON.
    fn cohort_profile(&self) -> PyResult<String> {
        to_json(&self.run()?.cohort)
    }

    /// Counters of the last run, as JSON.
    fn run_summary(&self) -> PyResult<String> {
        to_json(&self.run()?.summary)
    }

    /// Regression diagnostic of the last run as JSON, `None` when it was skipped.
    fn regression_report(&self) -> PyResult<Option<String>> {
        self.run()?.regression.as_ref().map(to_json).transpose()
    }

    /// Top sellers of the last run as JSON. `status` is all, active or inactive.
    #[pyo3(signature = (status="all"))]
    fn seller_ranking(&self, status: &str) -> PyResult<String> {
        let filter = StatusFilter::parse(status)
            .ok_or_else(|| PyValueError::new_err(format!("unknown status filter '{status}'")))?;
        let ranking = cohort::seller_ranking(&self.run()?.table, filter)?;
        to_json(&ranking)
    }

    /// Check a classified table (the last run's when omitted), as JSON.
    #[pyo3(signature = (table=None))]
    fn validate(&self, table: Option<PyDataFrame>) -> PyResult<String> {
        let report = match table {
            Some(df) => validate::check(&df.0)?,
            None => validate::check(&self.run()?.table)?,
        };
        to_json(&report)
    }
}

impl Classifier {
    fn run(&self) -> PyResult<&ClassificationRun> {
        self.last_run
            .as_ref()
            .ok_or_else(|| PyValueError::new_err("no classification run yet; call classify() first"))
    }
}
