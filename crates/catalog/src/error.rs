use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid instruction id '{0}'")]
    InvalidId(String),

    #[error("Atomic write to {path} failed after {attempts} attempt(s): {source}")]
    AtomicWrite {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
}

impl CatalogError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable machine-readable code used in dispatcher error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::IoError(_) | Self::AtomicWrite { .. } => "io_error",
            Self::SerializationError(_) => "invalid_request",
            Self::Validation(_) | Self::InvalidId(_) => "validation",
        }
    }
}
