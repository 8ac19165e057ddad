//! # incidex-model
//!
//! Sentence embedding inference for incidex.
//!
//! - **Embedding model**: a BERT bi-encoder run locally with Candle
//! - **Model locator**: runtime path resolution for installed models
//! - **Config**: the `embedding` section of the incidex config file
//!
//! Test doubles are not provided here; consuming crates implement
//! [`EmbeddingModel`] themselves when they need a deterministic embedder.
//!
//! ## Model Location
//!
//! 1. `$INCIDEX_MODELS_DIR`
//! 2. `~/.incidex/models`
//! 3. `{exe_dir}/models`
//!
//! ## Usage
//!
//! ```ignore
//! use incidex_model::{create_embedding_model, EmbeddingConfig, EmbeddingModel};
//!
//! let model = create_embedding_model(&EmbeddingConfig::default())?;
//! let vectors = model.embed(&["Worker slipped on an icy walkway"])?;
//! assert_eq!(vectors[0].len(), model.dimension());
//! ```

pub mod config;
pub mod error;
pub mod model_locator;

#[cfg(feature = "embedded")]
mod embedding;

pub use error::{ModelError, ModelResult};

pub use config::{DevicePreference, EmbeddingConfig, HuggingFaceModelConfig, ModelInfo};

pub use model_locator::{ModelLocator, EMBEDDINGS_SUBDIR, MODELS_DIR_ENV, REQUIRED_MODEL_FILES};

#[cfg(feature = "embedded")]
pub use embedding::CandleEmbeddingModel;

/// Default embedding model (384-dimensional MiniLM).
pub const DEFAULT_EMBEDDING_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

// ============================================================================
// Embedding Model Trait
// ============================================================================

/// A text embedder producing fixed-dimension vectors.
///
/// Implementations must be `Send + Sync`; the engine shares one instance
/// between index builds and queries.
pub trait EmbeddingModel: Send + Sync + std::fmt::Debug {
    /// Embed a batch of texts, one vector of length `dimension()` per input.
    fn embed(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>>;

    /// Embed owned strings.
    fn embed_batch(&self, texts: &[String]) -> ModelResult<Vec<Vec<f32>>> {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.embed(&refs)
    }

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> ModelResult<Vec<f32>> {
        self.embed(&[text])?
            .pop()
            .ok_or_else(|| ModelError::embedding_failed(self.model_id(), "model returned no vector"))
    }

    fn dimension(&self) -> usize;

    fn model_info(&self) -> &ModelInfo;

    fn model_id(&self) -> &str {
        &self.model_info().model_id
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Load the configured embedding model.
#[cfg(feature = "embedded")]
pub fn create_embedding_model(config: &EmbeddingConfig) -> ModelResult<Box<dyn EmbeddingModel>> {
    Ok(Box::new(CandleEmbeddingModel::new(config)?))
}

#[cfg(not(feature = "embedded"))]
pub fn create_embedding_model(_config: &EmbeddingConfig) -> ModelResult<Box<dyn EmbeddingModel>> {
    Err(ModelError::ProviderNotAvailable {
        provider: "candle".to_string(),
        reason: "incidex-model was built without the 'embedded' feature".to_string(),
    })
}
