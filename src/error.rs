use std::io;

use thiserror::Error;

/// Error type for job configuration, sorting invariants, label lookups and IO.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("sort order violated: {0}")]
    SortOrder(String),
    #[error("no label for key '{key}' in resolver '{resolver}'")]
    LabelNotFound { resolver: String, key: String },
    #[error("data source failure: {0}")]
    Source(String),
    /// One unreadable record; the run skips it and goes on
    #[error("malformed record at {0}")]
    MalformedRecord(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("worker thread '{0}' panicked")]
    WorkerPanicked(String),
}

impl ExtractError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        ExtractError::Configuration(message.into())
    }

    /// Whether the error concerns a single record rather than the run
    pub fn is_record_error(&self) -> bool {
        matches!(self, ExtractError::MalformedRecord(_))
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ExtractError>;
