use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    /// Caller supplied input that can never succeed (empty query, `k == 0`).
    #[error("Invalid input: {0}")]
    Validation(String),

    /// An embedding or generation backend failed or returned garbage.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// True for failures of an external model backend, which callers degrade around.
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Error::Provider(_) | Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
