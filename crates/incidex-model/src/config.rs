//! Configuration types for incidex-model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model_locator::{model_name, ModelLocator, EMBEDDINGS_SUBDIR};
use crate::DEFAULT_EMBEDDING_MODEL_ID;

// ============================================================================
// DevicePreference
// ============================================================================

/// Preference for compute device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// GPU if one was compiled in and is usable, else CPU.
    #[default]
    Auto,
    /// Require a GPU (Metal on macOS, CUDA elsewhere).
    Gpu,
    /// CPU only.
    Cpu,
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gpu" | "metal" | "cuda" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            _ => Err(format!(
                "Unknown device: '{}'. Use 'auto', 'gpu', or 'cpu'.",
                s
            )),
        }
    }
}

// ============================================================================
// ModelInfo
// ============================================================================

/// Identity and shape of a loaded embedding model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub dimension: usize,
    pub max_seq_len: usize,
}

impl ModelInfo {
    pub fn new(model_id: impl Into<String>, dimension: usize, max_seq_len: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            max_seq_len,
        }
    }
}

// ============================================================================
// EmbeddingConfig
// ============================================================================

/// Configuration for the sentence embedding model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Hugging Face model id, e.g. "sentence-transformers/all-MiniLM-L6-v2".
    #[serde(default = "default_model_id")]
    pub model_id: String,

    #[serde(default)]
    pub device: DevicePreference,

    /// Explicit model directory. Skips the locator search when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    /// Token limit per input; longer inputs are truncated.
    #[serde(default = "default_max_seq_len")]
    pub max_sequence_length: usize,

    /// Texts per forward pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_model_id() -> String {
    DEFAULT_EMBEDDING_MODEL_ID.to_string()
}

fn default_max_seq_len() -> usize {
    256
}

fn default_batch_size() -> usize {
    32
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            device: DevicePreference::default(),
            model_path: None,
            max_sequence_length: default_max_seq_len(),
            batch_size: default_batch_size(),
        }
    }
}

impl EmbeddingConfig {
    /// Directory the model is loaded from.
    ///
    /// An explicit `model_path` wins; otherwise the locator's search order
    /// applies. When nothing is found the conventional user location is
    /// returned so the caller can report where the model was expected.
    pub fn effective_model_path(&self) -> PathBuf {
        if let Some(ref path) = self.model_path {
            return path.clone();
        }

        ModelLocator::new()
            .embedding_model_path(&self.model_id)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".incidex")
                    .join("models")
                    .join(EMBEDDINGS_SUBDIR)
                    .join(model_name(&self.model_id))
            })
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }
}

// ============================================================================
// HuggingFaceModelConfig
// ============================================================================

/// The subset of a model's config.json we inspect before loading weights.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HuggingFaceModelConfig {
    #[serde(default)]
    pub architectures: Vec<String>,
    #[serde(default)]
    pub hidden_size: usize,
    #[serde(default = "default_max_position")]
    pub max_position_embeddings: usize,
    #[serde(default)]
    pub model_type: String,
}

fn default_max_position() -> usize {
    512
}

impl HuggingFaceModelConfig {
    /// Whether the model is a plain BERT encoder.
    pub fn is_bert(&self) -> bool {
        if self.model_type.eq_ignore_ascii_case("bert") {
            return true;
        }
        self.architectures
            .iter()
            .any(|a| a.to_lowercase().starts_with("bert"))
    }

    /// Name used in error messages.
    pub fn architecture_name(&self) -> String {
        self.architectures
            .first()
            .cloned()
            .unwrap_or_else(|| self.model_type.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_preference_parsing() {
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!("CUDA".parse::<DevicePreference>().unwrap(), DevicePreference::Gpu);
        assert_eq!("cpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_embedding_config_yaml_names() {
        let json = serde_json::json!({
            "modelId": "sentence-transformers/all-MiniLM-L6-v2",
            "device": "cpu",
            "batchSize": 8
        });
        let config: EmbeddingConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.device, DevicePreference::Cpu);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.max_sequence_length, 256);
        assert!(config.model_path.is_none());
    }

    #[test]
    fn test_explicit_model_path_wins() {
        let config = EmbeddingConfig::default().with_model_path("/opt/models/minilm");
        assert_eq!(config.effective_model_path(), PathBuf::from("/opt/models/minilm"));
    }

    #[test]
    fn test_is_bert() {
        let bert = HuggingFaceModelConfig {
            architectures: vec!["BertModel".to_string()],
            hidden_size: 384,
            max_position_embeddings: 512,
            model_type: "bert".to_string(),
        };
        assert!(bert.is_bert());

        let roberta = HuggingFaceModelConfig {
            architectures: vec!["XLMRobertaModel".to_string()],
            model_type: "xlm-roberta".to_string(),
            ..bert
        };
        assert!(!roberta.is_bert());
        assert_eq!(roberta.architecture_name(), "XLMRobertaModel");
    }
}
