//! Collection configuration and the active-collection meta file.
//!
//! A logical collection (e.g. `safety_incidents`) is served by one physical
//! generation at a time (`safety_incidents-g3`). The meta file
//! `<root>/<logical>.meta.json` records which generation is active and how
//! many chunks it is expected to hold. It is only written after a generation
//! has been fully populated, so a crash mid-build never activates a partial
//! collection.

use super::traits::VectorMetric;
use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

// ============================================================================
// Constants
// ============================================================================

/// Default backend name.
pub const DEFAULT_BACKEND: &str = "lancedb";

/// Suffix of the active-collection meta file.
pub const COLLECTION_META_SUFFIX: &str = ".meta.json";

/// LanceDB table name inside each physical collection directory.
pub const LANCEDB_TABLE_NAME: &str = "chunks";

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// CollectionConfig
// ============================================================================

/// Configuration for creating or opening a physical collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    /// Dimension of vectors in the collection.
    pub dimension: usize,

    /// Distance metric for similarity search.
    #[serde(default)]
    pub metric: VectorMetric,
}

impl CollectionConfig {
    /// Create a cosine collection config.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            metric: VectorMetric::Cosine,
        }
    }

    /// Set the distance metric.
    pub fn with_metric(mut self, metric: VectorMetric) -> Self {
        self.metric = metric;
        self
    }
}

// ============================================================================
// CollectionMeta
// ============================================================================

/// Meta record for the active generation of a logical collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMeta {
    /// Logical collection name.
    pub collection: String,

    /// Generation number of the active physical collection.
    pub generation: u64,

    /// Backend used for this collection.
    pub backend: String,

    /// Embedding model the vectors were produced with.
    pub embedding_model: String,

    /// Dimension of vectors.
    pub dimension: usize,

    /// Distance metric.
    pub metric: VectorMetric,

    /// Number of chunks the generation was populated with.
    pub chunk_count: usize,

    /// Number of source records the chunks were built from.
    #[serde(default)]
    pub record_count: usize,

    /// Digest of the chunk ids, texts and metadata the generation holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_fingerprint: Option<String>,

    /// Schema version for future migrations.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Creation timestamp (ISO 8601).
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl CollectionMeta {
    /// Create a meta record for a freshly populated generation.
    pub fn new(
        collection: impl Into<String>,
        generation: u64,
        backend: impl Into<String>,
        embedding_model: impl Into<String>,
        config: &CollectionConfig,
    ) -> Self {
        Self {
            collection: collection.into(),
            generation,
            backend: backend.into(),
            embedding_model: embedding_model.into(),
            dimension: config.dimension,
            metric: config.metric,
            chunk_count: 0,
            record_count: 0,
            dataset_fingerprint: None,
            schema_version: SCHEMA_VERSION,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// Set the populated counts.
    pub fn with_counts(mut self, chunk_count: usize, record_count: usize) -> Self {
        self.chunk_count = chunk_count;
        self.record_count = record_count;
        self
    }

    /// Record the fingerprint of the chunks written to this generation.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.dataset_fingerprint = Some(fingerprint.into());
        self
    }

    /// Whether this generation was built from chunks with `fingerprint`.
    pub fn matches_fingerprint(&self, fingerprint: &str) -> bool {
        self.dataset_fingerprint.as_deref() == Some(fingerprint)
    }

    /// Physical name of the active generation.
    pub fn physical_name(&self) -> String {
        physical_name(&self.collection, self.generation)
    }
}

/// Physical collection name for a generation: `<logical>-g<n>`.
pub fn physical_name(collection: &str, generation: u64) -> String {
    format!("{}-g{}", collection, generation)
}

// ============================================================================
// CollectionCompatibility
// ============================================================================

/// Result of checking an active collection against the running engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionCompatibility {
    /// Collection can be reused as-is.
    Compatible,

    /// Built by another backend.
    IncompatibleBackend { expected: String, actual: String },

    /// Built with another embedding model.
    IncompatibleModel { expected: String, actual: String },

    /// Built with another vector dimension.
    IncompatibleDimension { expected: usize, actual: usize },

    /// Written by a different schema version.
    IncompatibleSchema { expected: u32, actual: u32 },
}

impl CollectionCompatibility {
    /// Check if the collection is compatible.
    pub fn is_compatible(&self) -> bool {
        matches!(self, CollectionCompatibility::Compatible)
    }
}

impl std::fmt::Display for CollectionCompatibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compatible => write!(f, "compatible"),
            Self::IncompatibleBackend { expected, actual } => {
                write!(f, "backend mismatch: expected '{}', found '{}'", expected, actual)
            }
            Self::IncompatibleModel { expected, actual } => {
                write!(f, "embedding model mismatch: expected '{}', found '{}'", expected, actual)
            }
            Self::IncompatibleDimension { expected, actual } => {
                write!(f, "dimension mismatch: expected {}, found {}", expected, actual)
            }
            Self::IncompatibleSchema { expected, actual } => {
                write!(f, "schema version mismatch: expected {}, found {}", expected, actual)
            }
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Check whether an active collection can serve the given backend/model.
pub fn check_collection_compatibility(
    meta: &CollectionMeta,
    backend: &str,
    embedding_model: &str,
    dimension: usize,
) -> CollectionCompatibility {
    if meta.schema_version != SCHEMA_VERSION {
        return CollectionCompatibility::IncompatibleSchema {
            expected: SCHEMA_VERSION,
            actual: meta.schema_version,
        };
    }
    if meta.backend != backend {
        return CollectionCompatibility::IncompatibleBackend {
            expected: backend.to_string(),
            actual: meta.backend.clone(),
        };
    }
    if meta.embedding_model != embedding_model {
        return CollectionCompatibility::IncompatibleModel {
            expected: embedding_model.to_string(),
            actual: meta.embedding_model.clone(),
        };
    }
    if meta.dimension != dimension {
        return CollectionCompatibility::IncompatibleDimension {
            expected: dimension,
            actual: meta.dimension,
        };
    }
    CollectionCompatibility::Compatible
}

fn meta_path(root: &Path, collection: &str) -> PathBuf {
    root.join(format!("{}{}", collection, COLLECTION_META_SUFFIX))
}

/// Load the active-collection meta, or `None` if the collection was never activated.
pub fn load_collection_meta(root: &Path, collection: &str) -> DbResult<Option<CollectionMeta>> {
    let path = meta_path(root, collection);
    if !path.exists() {
        return Ok(None);
    }
    debug!("Loading collection meta from {:?}", path);

    let content = fs::read_to_string(&path).map_err(|e| {
        DbError::collection_io(&path, format!("Failed to read collection meta: {}", e))
    })?;

    let meta: CollectionMeta = serde_json::from_str(&content).map_err(|e| {
        DbError::collection_parse(&path, format!("Failed to parse collection meta: {}", e))
    })?;

    Ok(Some(meta))
}

/// Atomically write the active-collection meta (write temp file, then rename).
pub fn write_collection_meta(root: &Path, meta: &CollectionMeta) -> DbResult<()> {
    let path = meta_path(root, &meta.collection);
    debug!("Writing collection meta to {:?}", path);

    fs::create_dir_all(root)?;

    let tmp = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(meta)?;
    fs::write(&tmp, content)?;
    fs::rename(&tmp, &path)?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_meta() -> CollectionMeta {
        CollectionMeta::new(
            "safety_incidents",
            3,
            "simple",
            "sentence-transformers/all-MiniLM-L6-v2",
            &CollectionConfig::new(384),
        )
        .with_counts(120, 40)
    }

    #[test]
    fn test_physical_name() {
        assert_eq!(physical_name("safety_incidents", 3), "safety_incidents-g3");
        assert_eq!(sample_meta().physical_name(), "safety_incidents-g3");
    }

    #[test]
    fn test_meta_serialization() {
        let json = serde_json::to_string(&sample_meta()).unwrap();
        assert!(json.contains("\"chunkCount\":120"));
        assert!(json.contains("\"metric\":\"cosine\""));

        let parsed: CollectionMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sample_meta());
    }

    #[test]
    fn test_fingerprint_matching() {
        let meta = sample_meta();
        assert!(!meta.matches_fingerprint("abc"));
        assert!(!serde_json::to_string(&meta).unwrap().contains("datasetFingerprint"));

        let meta = meta.with_fingerprint("abc");
        assert!(meta.matches_fingerprint("abc"));
        assert!(!meta.matches_fingerprint("abd"));
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"datasetFingerprint\":\"abc\""));
    }

    #[test]
    fn test_meta_write_and_load() {
        let temp = TempDir::new().unwrap();
        assert!(load_collection_meta(temp.path(), "safety_incidents")
            .unwrap()
            .is_none());

        write_collection_meta(temp.path(), &sample_meta()).unwrap();
        let loaded = load_collection_meta(temp.path(), "safety_incidents")
            .unwrap()
            .unwrap();
        assert_eq!(loaded.generation, 3);
        assert_eq!(loaded.chunk_count, 120);
    }

    #[test]
    fn test_corrupted_meta_is_an_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("safety_incidents.meta.json"), "{not json").unwrap();
        let result = load_collection_meta(temp.path(), "safety_incidents");
        assert!(matches!(result, Err(DbError::CollectionParse { .. })));
    }

    #[test]
    fn test_compatibility() {
        let meta = sample_meta();
        let model = "sentence-transformers/all-MiniLM-L6-v2";
        assert!(check_collection_compatibility(&meta, "simple", model, 384).is_compatible());
        assert!(matches!(
            check_collection_compatibility(&meta, "lancedb", model, 384),
            CollectionCompatibility::IncompatibleBackend { .. }
        ));
        assert!(matches!(
            check_collection_compatibility(&meta, "simple", "other-model", 384),
            CollectionCompatibility::IncompatibleModel { .. }
        ));
        assert!(matches!(
            check_collection_compatibility(&meta, "simple", model, 768),
            CollectionCompatibility::IncompatibleDimension {
                expected: 768,
                actual: 384
            }
        ));
    }
}
