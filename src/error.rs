use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by the external modelling engine.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Error, Debug)]
pub enum CloeError {
    #[error("Data not loaded: {0}")]
    NotLoaded(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration: {0}")]
    Config(String),

    #[error("Template '{template}': {message}")]
    Template { template: String, message: String },

    #[error("Error reading input data from {}: {source}", path.display())]
    InputLoad {
        path: PathBuf,
        source: Box<CloeError>,
    },

    #[error("InvalidData: {0}")]
    InvalidData(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error(
        "Error assigning time series column={column} datasource={data_source} \
         catchment={catchment} fus={functional_unit} constituent={constituent} \
         source={source_name}: {message}"
    )]
    Assignment {
        column: String,
        data_source: String,
        catchment: String,
        functional_unit: String,
        constituent: String,
        source_name: String,
        message: String,
    },

    #[error("Consistency: {0}")]
    Consistency(String),
}

pub type CloeResult<T> = Result<T, CloeError>;

#[cfg(feature = "python")]
mod python {
    use pyo3::exceptions::PyRuntimeError;
    use pyo3::PyErr;

    use super::{CloeError, EngineError};

    impl From<CloeError> for PyErr {
        fn from(err: CloeError) -> PyErr {
            PyRuntimeError::new_err(err.to_string())
        }
    }

    impl From<PyErr> for EngineError {
        fn from(err: PyErr) -> Self {
            EngineError(err.to_string())
        }
    }

    impl From<PyErr> for CloeError {
        fn from(err: PyErr) -> Self {
            CloeError::Engine(err.into())
        }
    }
}
