//! Error types module
//!
//! All errors are unified under the `AppError` enum: ingest validation and
//! fixity failures, registry lookups, storage divergence, conversion and
//! export failures, plus database/storage/internal plumbing.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx`
//! feature so non-persistence crates can depend on this one without pulling
//! in a database driver.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected client errors (validation, fixity mismatch, not found)
    Debug,
    /// Recoverable or secondary issues
    Warn,
    /// Unexpected failures
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[error("Invalid submission: {0}")]
    Validation(String),

    #[error("Fixity check failed: declared {declared}, computed {computed}")]
    FixityMismatch { declared: String, computed: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Physical file missing: {0}")]
    PhysicalFileMissing(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    /// HTTP status code this error maps to.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation(_) | AppError::FixityMismatch { .. } => 400,
            AppError::NotFound(_) => 404,
            AppError::PhysicalFileMissing(_) => 409,
            #[cfg(feature = "sqlx")]
            AppError::Database(_) => 500,
            AppError::Conversion(_)
            | AppError::Export(_)
            | AppError::Storage(_)
            | AppError::Internal(_)
            | AppError::InternalWithSource { .. } => 500,
        }
    }

    /// Machine-readable error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::FixityMismatch { .. } => "FIXITY_MISMATCH",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::PhysicalFileMissing(_) => "PHYSICAL_FILE_MISSING",
            AppError::Conversion(_) => "CONVERSION_FAILURE",
            AppError::Export(_) => "EXPORT_FAILURE",
            AppError::Storage(_) => "STORAGE_ERROR",
            #[cfg(feature = "sqlx")]
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "INTERNAL_ERROR",
        }
    }

    /// Log level appropriate for this error. Client-caused errors stay at
    /// debug so they do not flood production logs.
    pub fn log_level(&self) -> LogLevel {
        match self {
            AppError::Validation(_) | AppError::FixityMismatch { .. } | AppError::NotFound(_) => {
                LogLevel::Debug
            }
            AppError::PhysicalFileMissing(_) | AppError::Conversion(_) => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }

    /// Whether internal detail should be hidden from API clients.
    pub fn is_sensitive(&self) -> bool {
        matches!(
            self,
            AppError::Internal(_) | AppError::InternalWithSource { .. }
        ) || {
            #[cfg(feature = "sqlx")]
            {
                matches!(self, AppError::Database(_))
            }
            #[cfg(not(feature = "sqlx"))]
            {
                false
            }
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Storage(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::Validation(format!("UUID parsing error: {}", err))
    }
}
