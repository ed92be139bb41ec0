use crate::update::BatchResult;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FixError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Partial batch failure: {0}")]
    PartialBatchFailure(BatchResult),

    #[error("Missing identifier: {0}")]
    MissingIdentifier(String),

    #[error("Cannot derive value: {0}")]
    Underivable(String),

    #[error("Invalid field path '{0}': {1}")]
    InvalidPath(String, String),

    #[error("Path conflict at '{0}': {1}")]
    PathConflict(String, String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),

    #[error("Document '{0}' already exists in collection '{1}'")]
    DuplicateId(String, String),

    #[error("Change log error: {0}")]
    ChangeLog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, FixError>;

impl From<std::io::Error> for FixError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for FixError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl FixError {
    /// Batch result reported by the store, if this is a partial failure.
    pub fn batch_result(&self) -> Option<&BatchResult> {
        match self {
            Self::PartialBatchFailure(result) => Some(result),
            _ => None,
        }
    }
}
