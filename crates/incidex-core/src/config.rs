//! Configuration for the incidex engine.
//!
//! Loaded from YAML (default `~/.incidex/config.yaml`). A missing file yields
//! defaults, so the engine runs without any setup.
//!
//! # Example YAML
//!
//! ```yaml
//! datasetPath: data/hackathon_base_table.csv
//! indexPath: data/incident_index
//! collection: safety_incidents
//! backend: lancedb
//! embedding:
//!   modelId: sentence-transformers/all-MiniLM-L6-v2
//!   device: auto
//!   batchSize: 32
//! retrieval:
//!   defaultResults: 8
//!   overfetchFactor: 3
//!   maxCandidates: 50
//!   blendThreshold: 3
//!   semanticWeight: 0.70
//!   keywordWeight: 0.30
//!   sectionBoost: 0.05
//!   minKeywordTerms: 2
//! indexing:
//!   minChunkChars: 20
//!   insertBatchSize: 200
//! context:
//!   maxBodyChars: 600
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use incidex_model::EmbeddingConfig;

use crate::errors::{IncidexError, IncidexResult};

/// Environment variable overriding the dataset path.
pub const DATASET_ENV: &str = "INCIDEX_DATASET";

/// Environment variable overriding the index directory.
pub const INDEX_PATH_ENV: &str = "INCIDEX_INDEX_PATH";

/// Environment variable pointing at the config file.
pub const CONFIG_ENV: &str = "INCIDEX_CONFIG";

/// Logical name of the incident collection.
pub const DEFAULT_COLLECTION: &str = "safety_incidents";

// ============================================================================
// EngineConfig
// ============================================================================

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// CSV dataset the index is built from.
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    /// Directory holding collection generations and the meta file.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Logical collection name.
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Collection backend: `lancedb` or `simple`.
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub context: ContextConfig,
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("data/hackathon_base_table.csv")
}

fn default_index_path() -> PathBuf {
    PathBuf::from("data/incident_index")
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_backend() -> String {
    incidex_db::vector::DEFAULT_BACKEND.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
            index_path: default_index_path(),
            collection: default_collection(),
            backend: default_backend(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            indexing: IndexingConfig::default(),
            context: ContextConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from `$INCIDEX_CONFIG`, else `~/.incidex/config.yaml`, then apply
    /// environment overrides.
    pub fn load_default() -> IncidexResult<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(Self::default_path);

        let config = match path {
            Some(path) => Self::from_path(&path)?,
            None => {
                tracing::debug!("Could not determine home directory, using default config");
                Self::default()
            }
        };
        Ok(config.with_env_overrides())
    }

    /// Load from a specific path. A missing file yields defaults.
    pub fn from_path(path: &Path) -> IncidexResult<Self> {
        if !path.exists() {
            tracing::debug!("Config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| IncidexError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| IncidexError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        for warning in config.validate()? {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok(config)
    }

    /// `~/.incidex`
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".incidex"))
    }

    /// `~/.incidex/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|d| d.join("config.yaml"))
    }

    /// Apply `INCIDEX_DATASET` and `INCIDEX_INDEX_PATH`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dataset) = std::env::var_os(DATASET_ENV) {
            self.dataset_path = PathBuf::from(dataset);
        }
        if let Some(index) = std::env::var_os(INDEX_PATH_ENV) {
            self.index_path = PathBuf::from(index);
        }
        self
    }

    /// Validate, returning non-fatal warnings.
    pub fn validate(&self) -> IncidexResult<Vec<String>> {
        let mut warnings = Vec::new();

        if self.collection.trim().is_empty() {
            return Err(IncidexError::invalid_config(
                "collection cannot be empty",
                "Set collection to a name such as `safety_incidents`",
            ));
        }

        let backends = incidex_db::vector::available_backends();
        if !backends.contains(&self.backend.as_str()) {
            return Err(IncidexError::invalid_config(
                format!("backend `{}` is not available", self.backend),
                format!("Use one of: {}", backends.join(", ")),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(IncidexError::invalid_config(
                "embedding.batchSize cannot be 0",
                "Set batchSize to at least 1 (recommended: 32)",
            ));
        }

        warnings.extend(self.retrieval.validate()?);
        warnings.extend(self.indexing.validate()?);

        if self.context.max_body_chars == 0 {
            warnings.push("context.maxBodyChars=0 drops every excerpt body from the context".to_string());
        }

        Ok(warnings)
    }
}

// ============================================================================
// RetrievalConfig
// ============================================================================

/// Retrieval and reranking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    /// Results returned when the caller does not ask for a count.
    #[serde(default = "default_results")]
    pub default_results: usize,

    /// Candidates fetched per requested result before reranking.
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,

    /// Upper bound on the candidate pool.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Fewer filtered hits than this triggers blending with unfiltered hits.
    #[serde(default = "default_blend_threshold")]
    pub blend_threshold: usize,

    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,

    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,

    /// Bonus when a chunk's section matches the query's intent.
    #[serde(default = "default_section_boost")]
    pub section_boost: f64,

    /// Below this many meaningful query words, keyword overlap scores 0.
    #[serde(default = "default_min_keyword_terms")]
    pub min_keyword_terms: usize,
}

fn default_results() -> usize {
    8
}
fn default_overfetch_factor() -> usize {
    3
}
fn default_max_candidates() -> usize {
    50
}
fn default_blend_threshold() -> usize {
    3
}
fn default_semantic_weight() -> f64 {
    0.70
}
fn default_keyword_weight() -> f64 {
    0.30
}
fn default_section_boost() -> f64 {
    0.05
}
fn default_min_keyword_terms() -> usize {
    2
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_results: default_results(),
            overfetch_factor: default_overfetch_factor(),
            max_candidates: default_max_candidates(),
            blend_threshold: default_blend_threshold(),
            semantic_weight: default_semantic_weight(),
            keyword_weight: default_keyword_weight(),
            section_boost: default_section_boost(),
            min_keyword_terms: default_min_keyword_terms(),
        }
    }
}

impl RetrievalConfig {
    /// Size of the candidate pool for `n_results`.
    pub fn candidate_count(&self, n_results: usize) -> usize {
        n_results
            .saturating_mul(self.overfetch_factor)
            .min(self.max_candidates)
    }

    pub fn validate(&self) -> IncidexResult<Vec<String>> {
        let mut warnings = Vec::new();

        if self.max_candidates == 0 {
            return Err(IncidexError::invalid_config(
                "retrieval.maxCandidates cannot be 0",
                "Set maxCandidates to at least 1 (recommended: 50)",
            ));
        }
        if self.overfetch_factor == 0 {
            return Err(IncidexError::invalid_config(
                "retrieval.overfetchFactor cannot be 0",
                "Set overfetchFactor to at least 1 (recommended: 3)",
            ));
        }
        for (name, value) in [
            ("semanticWeight", self.semantic_weight),
            ("keywordWeight", self.keyword_weight),
            ("sectionBoost", self.section_boost),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(IncidexError::invalid_config(
                    format!("retrieval.{} must be a non-negative number, got {}", name, value),
                    "Use values between 0.0 and 1.0",
                ));
            }
        }

        let total = self.semantic_weight + self.keyword_weight;
        if (total - 1.0).abs() > 1e-6 {
            warnings.push(format!(
                "retrieval.semanticWeight + keywordWeight = {:.2}; scores will not be on the usual 0..1 scale",
                total
            ));
        }
        if self.blend_threshold > self.max_candidates {
            warnings.push(format!(
                "retrieval.blendThreshold={} exceeds maxCandidates={}; every filtered query will blend",
                self.blend_threshold, self.max_candidates
            ));
        }

        Ok(warnings)
    }
}

// ============================================================================
// IndexingConfig
// ============================================================================

/// Index build parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingConfig {
    /// Narrative sections shorter than this (trimmed, in characters) are not indexed.
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,

    /// Chunks per store insert call.
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
}

fn default_min_chunk_chars() -> usize {
    20
}
fn default_insert_batch_size() -> usize {
    200
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            min_chunk_chars: default_min_chunk_chars(),
            insert_batch_size: default_insert_batch_size(),
        }
    }
}

impl IndexingConfig {
    pub fn validate(&self) -> IncidexResult<Vec<String>> {
        if self.insert_batch_size == 0 {
            return Err(IncidexError::invalid_config(
                "indexing.insertBatchSize cannot be 0",
                "Set insertBatchSize to at least 1 (recommended: 200)",
            ));
        }
        let mut warnings = Vec::new();
        if self.min_chunk_chars == 0 {
            warnings.push("indexing.minChunkChars=0 indexes empty sections".to_string());
        }
        Ok(warnings)
    }
}

// ============================================================================
// ContextConfig
// ============================================================================

/// Formatting of retrieved hits for the language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextConfig {
    /// Narrative characters kept per source block.
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
}

fn default_max_body_chars() -> usize {
    600
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_body_chars: default_max_body_chars(),
        }
    }
}
