//! Adapter between incidex-model and the engine's error domain.

use std::sync::Arc;

use incidex_model::{EmbeddingConfig, EmbeddingModel, ModelError};

use crate::errors::{IncidexError, IncidexResult};

/// Convert an incidex-model error to an engine error.
pub fn from_model_error(err: ModelError) -> IncidexError {
    match err {
        ModelError::ModelsDirectoryNotFound { .. }
        | ModelError::IncompleteModelFiles { .. }
        | ModelError::DeviceNotAvailable { .. } => IncidexError::EmbeddingUnavailable {
            provider: "candle".to_string(),
            reason: err.to_string(),
        },

        ModelError::ModelNotFound { ref model_id, .. } => IncidexError::EmbeddingUnavailable {
            provider: model_id.clone(),
            reason: err.to_string(),
        },

        ModelError::ModelLoad { model_id, message } => IncidexError::EmbeddingUnavailable {
            provider: model_id,
            reason: message,
        },

        ModelError::UnsupportedArchitecture { .. } => IncidexError::EmbeddingUnavailable {
            provider: "candle".to_string(),
            reason: err.to_string(),
        },

        ModelError::ProviderNotAvailable { provider, reason } => {
            IncidexError::EmbeddingUnavailable { provider, reason }
        }

        ModelError::Tokenization { message } => IncidexError::EmbeddingFailed { reason: message },

        ModelError::EmbeddingFailed { model_id, message } => IncidexError::EmbeddingFailed {
            reason: format!("{}: {}", model_id, message),
        },

        ModelError::Io(io_err) => IncidexError::Io(io_err),

        ModelError::Json(json_err) => IncidexError::EmbeddingUnavailable {
            provider: "candle".to_string(),
            reason: format!("invalid model config: {}", json_err),
        },
    }
}

/// Extension trait to convert incidex-model results.
pub trait IntoIncidexResult<T> {
    fn into_incidex_result(self) -> IncidexResult<T>;
}

impl<T> IntoIncidexResult<T> for Result<T, ModelError> {
    fn into_incidex_result(self) -> IncidexResult<T> {
        self.map_err(from_model_error)
    }
}

/// Load the configured embedding model as a shared handle.
pub fn load_embedding_model(config: &EmbeddingConfig) -> IncidexResult<Arc<dyn EmbeddingModel>> {
    let model = incidex_model::create_embedding_model(config).into_incidex_result()?;
    Ok(Arc::from(model))
}
