use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutbreakError {
    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Schema mismatch: missing column {0}")]
    SchemaMismatch(String),

    #[error("Feature mismatch: model expects {expected:?}, got {found:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Data integrity: {0}")]
    DataIntegrity(String),

    #[error("Categorical field not found in table: {0}")]
    UnknownCategoryField(String),

    #[error("Value '{value}' for '{field}' was not seen during training")]
    UnseenCategory { field: String, value: String },

    #[error("No data available for {0}")]
    EmptyFilterResult(String),

    #[error("Model artifacts not found ({}). Run training first.", .0.display())]
    ArtifactsMissing(PathBuf),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Model: {0}")]
    Model(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    General(String),
}

impl OutbreakError {
    /// Errors that end a single request or field, not the process.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownCategoryField(_)
                | Self::UnseenCategory { .. }
                | Self::EmptyFilterResult(_)
                | Self::ArtifactsMissing(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, OutbreakError>;

#[cfg(feature = "python")]
mod python {
    use pyo3::exceptions::PyRuntimeError;
    use pyo3::PyErr;

    use super::OutbreakError;

    impl From<OutbreakError> for PyErr {
        fn from(err: OutbreakError) -> PyErr {
            PyRuntimeError::new_err(err.to_string())
        }
    }

    impl From<PyErr> for OutbreakError {
        fn from(err: PyErr) -> Self {
            OutbreakError::General(err.to_string())
        }
    }
}
