#[cfg(feature = "python")]
use pyo3::exceptions::PyRuntimeError;
#[cfg(feature = "python")]
use pyo3::PyErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifyError {
    /// Empty or unjoinable input. The only data condition that aborts a run.
    #[error("Structural failure: {0}")]
    Structural(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("InvalidData: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, ClassifyError>;

#[cfg(feature = "python")]
impl From<ClassifyError> for PyErr {
    fn from(err: ClassifyError) -> PyErr {
        PyRuntimeError::new_err(err.to_string())
    }
}
