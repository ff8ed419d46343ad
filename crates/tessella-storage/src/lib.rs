//! Local filesystem store for masters and derivatives.
//!
//! Ingest streams into a staging area while a SHA-256 accumulator runs over
//! the bytes; only a verified staged file is promoted (atomic rename) to its
//! canonical location. Filenames are sanitized so a submission can never
//! escape the store root.

mod local;

pub use local::{LocalStore, StagedFile};

use std::io;
use tessella_core::AppError;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidFilename(msg) => AppError::Validation(msg),
            StorageError::NotFound(path) => AppError::PhysicalFileMissing(path),
            other => AppError::Storage(other.to_string()),
        }
    }
}
