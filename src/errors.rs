//! Error types shared by every storage driver.

use std::io;
use thiserror::Error;

/// Errors raised by the fail-loud storage operations.
///
/// Query and cleanup operations (`get`, `meta`, `delete*`, `list_objects`,
/// `abort_multipart_upload`) never surface these; they log and return a
/// sentinel instead.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no driver registered for kind `{0}`")]
    UnknownDriverKind(String),
    #[error("disk `{disk}` is missing required config `{field}`")]
    MissingRequiredConfig { disk: String, field: &'static str },
    #[error("disk `{0}` is not configured")]
    UnknownDisk(String),
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),
    #[error("provider returned no upload id for `{path}`")]
    UploadInit { path: String },
    #[error("provider returned no tag for part {part_number} of `{path}`")]
    PartUpload { path: String, part_number: i32 },
    #[error("signed url lifetime of {0} minutes is not supported")]
    InvalidExpiry(u64),
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("{operation} failed: {message}")]
    Provider {
        operation: &'static str,
        message: String,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Shortcut for wrapping a provider SDK failure.
    pub fn provider(operation: &'static str, err: impl ToString) -> Self {
        Self::Provider {
            operation,
            message: err.to_string(),
        }
    }

    /// True when the error means the object simply is not there.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<config::ConfigError> for StorageError {
    fn from(err: config::ConfigError) -> Self {
        StorageError::InvalidConfig(err.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
