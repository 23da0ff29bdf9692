//! Error types for schema loading.

use std::path::PathBuf;
use thiserror::Error;

/// Schema operation result type.
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema loading errors.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Config file could not be read
    #[error("Failed to read schema config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON
    #[error("Invalid schema JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file is valid JSON but not a schema config
    #[error("Invalid schema config: {0}")]
    Invalid(String),
}

impl SchemaError {
    /// Create an invalid-config error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
