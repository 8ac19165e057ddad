//! Candle BERT sentence embedder.
//!
//! Mean pooling over the attention mask followed by L2 normalization, which
//! matches how sentence-transformers MiniLM models are meant to be used.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::config::{DevicePreference, EmbeddingConfig, HuggingFaceModelConfig, ModelInfo};
use crate::error::{ModelError, ModelResult};
use crate::model_locator::ModelLocator;
use crate::EmbeddingModel;

/// Local BERT embedding model.
///
/// Inference only reads the weights, so concurrent callers share one model
/// without locking.
pub struct CandleEmbeddingModel {
    info: ModelInfo,
    batch_size: usize,
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl std::fmt::Debug for CandleEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleEmbeddingModel")
            .field("model_id", &self.info.model_id)
            .field("dimension", &self.info.dimension)
            .field("device", &self.device)
            .finish()
    }
}

impl CandleEmbeddingModel {
    /// Load the model described by `config`.
    pub fn new(config: &EmbeddingConfig) -> ModelResult<Self> {
        let model_path = config.effective_model_path();
        if !model_path.exists() {
            return Err(ModelError::ModelNotFound {
                model_id: config.model_id.clone(),
                path: model_path,
            });
        }
        ModelLocator::new().validate_model_dir(&model_path)?;

        let raw_config = std::fs::read_to_string(model_path.join("config.json"))?;
        let hf_config: HuggingFaceModelConfig = serde_json::from_str(&raw_config)?;
        if !hf_config.is_bert() {
            return Err(ModelError::UnsupportedArchitecture {
                architecture: hf_config.architecture_name(),
            });
        }

        let max_seq_len = config
            .max_sequence_length
            .min(hf_config.max_position_embeddings);

        info!(
            "Loading embedding model '{}' from {:?} (dim={})",
            config.model_id, model_path, hf_config.hidden_size
        );

        let load_err = |e: &dyn std::fmt::Display| ModelError::model_load(&config.model_id, e.to_string());

        let tokenizer = load_tokenizer(&model_path, max_seq_len).map_err(|e| load_err(&e))?;
        let device = select_device(config.device)?;

        let bert_config: BertConfig = serde_json::from_str(&raw_config)?;
        let weights = model_path.join("model.safetensors");
        // SAFETY: the weights file is memory-mapped read-only and not modified while loaded.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DTYPE, &device) }
            .map_err(|e| load_err(&e))?;
        let model = BertModel::load(vb, &bert_config).map_err(|e| load_err(&e))?;

        Ok(Self {
            info: ModelInfo::new(&config.model_id, hf_config.hidden_size, max_seq_len),
            batch_size: config.batch_size.max(1),
            model,
            tokenizer,
            device,
        })
    }

    fn fail(&self, e: impl std::fmt::Display) -> ModelError {
        ModelError::embedding_failed(&self.info.model_id, e.to_string())
    }

    fn embed_chunk(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| ModelError::tokenization(e.to_string()))?;

        let rows = encodings.len();
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);

        let ids: Vec<u32> = encodings.iter().flat_map(|e| e.get_ids().to_vec()).collect();
        let mask: Vec<u32> = encodings
            .iter()
            .flat_map(|e| e.get_attention_mask().to_vec())
            .collect();

        let ids = Tensor::from_vec(ids, (rows, seq_len), &self.device).map_err(|e| self.fail(e))?;
        let mask = Tensor::from_vec(mask, (rows, seq_len), &self.device).map_err(|e| self.fail(e))?;
        let token_types = ids.zeros_like().map_err(|e| self.fail(e))?;

        let hidden = self
            .model
            .forward(&ids, &token_types, Some(&mask))
            .map_err(|e| self.fail(e))?;

        let pooled = mean_pool(&hidden, &mask).map_err(|e| self.fail(e))?;
        let normalized = l2_normalize(&pooled).map_err(|e| self.fail(e))?;
        normalized.to_vec2::<f32>().map_err(|e| self.fail(e))
    }
}

impl EmbeddingModel for CandleEmbeddingModel {
    fn embed(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            debug!("Embedding batch of {}", chunk.len());
            out.extend(self.embed_chunk(chunk)?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.info.dimension
    }

    fn model_info(&self) -> &ModelInfo {
        &self.info
    }
}

fn load_tokenizer(model_path: &Path, max_length: usize) -> Result<Tokenizer, String> {
    let mut tokenizer =
        Tokenizer::from_file(model_path.join("tokenizer.json")).map_err(|e| e.to_string())?;

    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        pad_id: 0,
        pad_token: "[PAD]".to_string(),
        ..Default::default()
    }));
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| e.to_string())?;

    Ok(tokenizer)
}

fn select_device(pref: DevicePreference) -> ModelResult<Device> {
    match pref {
        DevicePreference::Cpu => Ok(Device::Cpu),
        DevicePreference::Auto => Ok(try_gpu().unwrap_or_else(|| {
            info!("Using CPU");
            Device::Cpu
        })),
        DevicePreference::Gpu => try_gpu().ok_or_else(|| ModelError::DeviceNotAvailable {
            reason: if cfg!(any(feature = "metal", feature = "cuda")) {
                "no usable GPU was found".to_string()
            } else {
                "built without GPU support (rebuild with --features metal or --features cuda)"
                    .to_string()
            },
        }),
    }
}

fn try_gpu() -> Option<Device> {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Using Metal GPU");
                return Some(device);
            }
            Err(e) => debug!("Metal not available: {}", e),
        }
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("Using CUDA GPU");
                return Some(device);
            }
            Err(e) => debug!("CUDA not available: {}", e),
        }
    }

    None
}

fn mean_pool(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = mask
        .unsqueeze(2)?
        .to_dtype(DType::F32)?
        .broadcast_as(hidden.shape())?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    summed.broadcast_div(&counts)
}

fn l2_normalize(embeddings: &Tensor) -> candle_core::Result<Tensor> {
    let norm = embeddings
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .clamp(1e-12, f64::MAX)?;
    embeddings.broadcast_div(&norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_model_is_shared_without_locking() {
        assert_send_sync::<CandleEmbeddingModel>();
        assert_send_sync::<BertModel>();
    }

    #[test]
    fn test_mean_pool_ignores_padding() {
        let hidden = Tensor::new(&[[[1.0f32, 2.0], [3.0, 4.0], [100.0, 100.0]]], &Device::Cpu).unwrap();
        let mask = Tensor::new(&[[1u32, 1, 0]], &Device::Cpu).unwrap();
        let pooled = mean_pool(&hidden, &mask).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(pooled, vec![vec![2.0, 3.0]]);
    }

    #[test]
    fn test_l2_normalize_rows() {
        let rows = Tensor::new(&[[3.0f32, 4.0], [0.0, 0.0]], &Device::Cpu).unwrap();
        let normalized = l2_normalize(&rows).unwrap().to_vec2::<f32>().unwrap();
        assert!((normalized[0][0] - 0.6).abs() < 1e-6);
        assert!((normalized[0][1] - 0.8).abs() < 1e-6);
        assert_eq!(normalized[1], vec![0.0, 0.0]);
    }
}
