//! Error types for incidex-model.
//!
//! Discovery errors spell out where models were looked for and how to
//! install one, since a missing model is the most common first-run failure.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for incidex-model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while locating, loading or running a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// None of the search locations exists.
    #[error("{}", models_dir_hint(.searched))]
    ModelsDirectoryNotFound { searched: Vec<PathBuf> },

    /// The model directory for this id does not exist.
    #[error("Embedding model '{model_id}' not found (expected at {})\n\nDownload the model from Hugging Face into that directory.", .path.display())]
    ModelNotFound { model_id: String, path: PathBuf },

    /// The model directory lacks required files.
    #[error("Incomplete model at {}: missing {}", .path.display(), .missing.join(", "))]
    IncompleteModelFiles {
        path: PathBuf,
        missing: Vec<&'static str>,
    },

    /// Weights or tokenizer failed to load.
    #[error("Failed to load model '{model_id}': {message}")]
    ModelLoad { model_id: String, message: String },

    /// The model's config.json describes an architecture we cannot run.
    #[error("Unsupported model architecture '{architecture}' (only BERT encoders are supported)")]
    UnsupportedArchitecture { architecture: String },

    /// Tokenization failed.
    #[error("Tokenization failed: {message}")]
    Tokenization { message: String },

    /// Forward pass or pooling failed.
    #[error("Embedding failed for model '{model_id}': {message}")]
    EmbeddingFailed { model_id: String, message: String },

    /// Provider compiled out or unknown.
    #[error("Provider '{provider}' not available: {reason}")]
    ProviderNotAvailable { provider: String, reason: String },

    /// Requested GPU is not usable.
    #[error("Compute device not available: {reason}\n\nSet `embedding.device: cpu` in ~/.incidex/config.yaml or pass --device cpu.")]
    DeviceNotAvailable { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn models_dir_hint(searched: &[PathBuf]) -> String {
    let list = searched
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "No models directory found. Searched:\n{list}\n\n\
        Set $INCIDEX_MODELS_DIR, or place the model under ~/.incidex/models/embeddings/."
    )
}

impl ModelError {
    /// Create a model load error.
    pub fn model_load(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    /// Create an embedding failed error.
    pub fn embedding_failed(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingFailed {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    /// Create a tokenization error.
    pub fn tokenization(message: impl Into<String>) -> Self {
        Self::Tokenization {
            message: message.into(),
        }
    }

    /// Whether the error is about the model not being installed.
    pub fn is_missing_model(&self) -> bool {
        matches!(
            self,
            Self::ModelsDirectoryNotFound { .. }
                | Self::ModelNotFound { .. }
                | Self::IncompleteModelFiles { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_models_dir_hint_lists_locations() {
        let err = ModelError::ModelsDirectoryNotFound {
            searched: vec![PathBuf::from("/a/models"), PathBuf::from("/b/models")],
        };
        let msg = err.to_string();
        assert!(msg.contains("/a/models"));
        assert!(msg.contains("/b/models"));
        assert!(msg.contains("INCIDEX_MODELS_DIR"));
        assert!(err.is_missing_model());
    }

    #[test]
    fn test_incomplete_lists_missing_files() {
        let err = ModelError::IncompleteModelFiles {
            path: PathBuf::from("/m"),
            missing: vec!["tokenizer.json", "model.safetensors"],
        };
        assert!(err.to_string().contains("tokenizer.json, model.safetensors"));
        assert!(!ModelError::tokenization("x").is_missing_model());
    }
}
