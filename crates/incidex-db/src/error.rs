//! Error types for incidex-db.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for incidex-db operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in incidex-db operations.
#[derive(Debug, Error)]
pub enum DbError {
    // ========================================================================
    // Collection errors
    // ========================================================================
    /// Collection I/O error.
    #[error("Collection I/O error at {path}: {message}")]
    CollectionIo { path: PathBuf, message: String },

    /// Collection data or meta file could not be parsed.
    #[error("Collection parse error at {path}: {message}")]
    CollectionParse { path: PathBuf, message: String },

    /// Collection does not exist.
    #[error("Collection '{name}' not found under {root}")]
    CollectionNotFound { name: String, root: PathBuf },

    /// Vector dimension mismatch.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// LanceDB error.
    #[cfg(feature = "lancedb")]
    #[error("LanceDB error: {message}")]
    LanceDb { message: String },

    // ========================================================================
    // Filter errors
    // ========================================================================
    /// Filter document is malformed (unknown field, unsupported operator).
    #[error("Invalid metadata filter: {reason}")]
    InvalidFilter { reason: String },

    /// Filter is well-formed but the collection cannot evaluate it.
    #[error("Metadata filter rejected: {reason}")]
    FilterRejected { reason: String },

    // ========================================================================
    // Dataset table errors
    // ========================================================================
    /// CSV file could not be read or decoded.
    #[error("Failed to read CSV table {path}: {message}")]
    Csv { path: PathBuf, message: String },

    // ========================================================================
    // General errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO error wrapper.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error wrapper.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a collection I/O error.
    pub fn collection_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CollectionIo {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a collection parse error.
    pub fn collection_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CollectionParse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid filter error.
    pub fn invalid_filter(reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            reason: reason.into(),
        }
    }

    /// Create a filter rejected error.
    pub fn filter_rejected(reason: impl Into<String>) -> Self {
        Self::FilterRejected {
            reason: reason.into(),
        }
    }

    /// Create a CSV table error.
    pub fn csv(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Csv {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error means the collection refused the filter itself.
    pub fn is_filter_error(&self) -> bool {
        matches!(self, Self::InvalidFilter { .. } | Self::FilterRejected { .. })
    }
}

#[cfg(feature = "lancedb")]
impl From<lancedb::Error> for DbError {
    fn from(err: lancedb::Error) -> Self {
        Self::LanceDb {
            message: err.to_string(),
        }
    }
}
