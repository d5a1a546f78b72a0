use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type for loading, schema, serialization, and persistence failures.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error("cannot parse '{}': {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("schema mismatch in '{}': {details}", path.display())]
    Schema { path: PathBuf, details: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("missing field '{field}' in {context}")]
    MissingField { field: String, context: String },
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PrepError {
    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn schema(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            details: details.into(),
        }
    }

    pub(crate) fn missing_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
            context: context.into(),
        }
    }
}
