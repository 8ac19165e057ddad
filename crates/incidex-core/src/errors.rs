//! Error types for incidex-core.

use std::path::PathBuf;

use thiserror::Error;

use incidex_db::DbError;

/// Result type alias for incidex-core operations.
pub type IncidexResult<T> = Result<T, IncidexError>;

/// Domain errors for the retrieval engine.
#[derive(Error, Debug)]
pub enum IncidexError {
    /// Retrieval was invoked before any index build succeeded.
    #[error("Index not initialized. Run `incidex index` first.")]
    NotInitialized,

    /// A rebuild is running; callers should back off and retry.
    #[error("Index rebuild in progress. Try again shortly.")]
    RebuildInProgress,

    /// The dataset file does not exist.
    #[error("Dataset not found at {}", .path.display())]
    DatasetNotFound { path: PathBuf },

    /// The dataset lacks required columns.
    #[error("Dataset is missing required columns: {}. Found: {}", .missing.join(", "), .found.join(", "))]
    DatasetMissingColumns {
        missing: Vec<String>,
        found: Vec<String>,
    },

    /// The dataset exists but could not be read or decoded.
    #[error("Failed to read dataset {}: {reason}", .path.display())]
    DatasetRead { path: PathBuf, reason: String },

    /// The embedding model could not be constructed.
    #[error("Embedding provider `{provider}` unavailable: {reason}")]
    EmbeddingUnavailable { provider: String, reason: String },

    /// Inference failed on an otherwise loaded model.
    #[error("Embedding failed: {reason}")]
    EmbeddingFailed { reason: String },

    /// Building a new index generation failed; the previous one keeps serving.
    #[error("Index build failed: {reason}")]
    IndexBuildFailed { reason: String },

    /// The index on disk was built for another backend or embedding model.
    #[error("Index does not match the current configuration: {reason}")]
    IndexIncompatible { reason: String },

    /// Storage layer error.
    #[error("Storage error: {0}")]
    Store(#[from] DbError),

    /// A caller-supplied filter could not be parsed.
    #[error("Invalid filter: {reason}")]
    InvalidFilter { reason: String },

    /// A configuration value is invalid.
    #[error("Invalid configuration: {message}. {hint}")]
    InvalidConfiguration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    /// The config file exists but cannot be parsed.
    #[error("Failed to parse config {}: {reason}", .path.display())]
    ConfigParse { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IncidexError {
    /// Create an index build error.
    pub fn index_build(reason: impl Into<String>) -> Self {
        Self::IndexBuildFailed {
            reason: reason.into(),
        }
    }

    /// Create an index incompatibility error.
    pub fn index_incompatible(reason: impl Into<String>) -> Self {
        Self::IndexIncompatible {
            reason: reason.into(),
        }
    }

    /// Create an invalid filter error.
    pub fn invalid_filter(reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Whether the caller should retry later rather than treat this as fatal.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RebuildInProgress)
    }

    /// Stable machine-readable code, used in JSON error output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::RebuildInProgress => "rebuild_in_progress",
            Self::DatasetNotFound { .. } => "dataset_not_found",
            Self::DatasetMissingColumns { .. } => "dataset_missing_columns",
            Self::DatasetRead { .. } => "dataset_read",
            Self::EmbeddingUnavailable { .. } => "embedding_unavailable",
            Self::EmbeddingFailed { .. } => "embedding_failed",
            Self::IndexBuildFailed { .. } => "index_build_failed",
            Self::IndexIncompatible { .. } => "index_incompatible",
            Self::Store(_) => "store",
            Self::InvalidFilter { .. } => "invalid_filter",
            Self::InvalidConfiguration { .. } => "invalid_configuration",
            Self::ConfigParse { .. } => "config_parse",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}
