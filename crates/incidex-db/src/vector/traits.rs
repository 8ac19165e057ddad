//! Chunk collection traits and core types.
//!
//! This module defines the abstraction every collection backend implements.

use crate::error::DbResult;
use serde::{Deserialize, Serialize};

use super::metadata::{ChunkMetadata, MetadataFilter};

// ============================================================================
// VectorMetric
// ============================================================================

/// Distance metric for similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorMetric {
    /// Cosine distance (default). `distance = 1 - cosine_similarity`.
    #[default]
    Cosine,
    /// Negated dot product.
    Dot,
    /// Euclidean (L2) distance.
    L2,
}

impl VectorMetric {
    /// Get the metric name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorMetric::Cosine => "cosine",
            VectorMetric::Dot => "dot",
            VectorMetric::L2 => "l2",
        }
    }
}

impl std::fmt::Display for VectorMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ChunkInsert
// ============================================================================

/// A chunk to insert (or overwrite) in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInsert {
    /// Deterministic chunk id, unique within the collection.
    pub id: String,

    /// The embedding vector.
    pub vector: Vec<f32>,

    /// Full chunk text, returned verbatim by queries.
    pub text: String,

    /// Flat metadata used for filtering and citation.
    pub metadata: ChunkMetadata,
}

impl ChunkInsert {
    /// Create a new chunk insert.
    pub fn new(
        id: impl Into<String>,
        vector: Vec<f32>,
        text: impl Into<String>,
        metadata: ChunkMetadata,
    ) -> Self {
        Self {
            id: id.into(),
            vector,
            text: text.into(),
            metadata,
        }
    }
}

// ============================================================================
// ChunkMatch
// ============================================================================

/// A single nearest-neighbour result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMatch {
    /// Chunk id.
    pub id: String,

    /// Stored chunk text.
    pub text: String,

    /// Stored chunk metadata.
    pub metadata: ChunkMetadata,

    /// Distance to the query vector (lower is closer).
    pub distance: f32,
}

impl ChunkMatch {
    /// Create a new match.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        metadata: ChunkMetadata,
        distance: f32,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
            distance,
        }
    }

    /// Similarity reported as `1 - distance`; closer vectors score nearer 1.0.
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

// ============================================================================
// ChunkCollection Trait
// ============================================================================

/// Core trait for chunk collection backends.
///
/// ## Implementation Notes
///
/// - Backends must be thread-safe; queries run concurrently.
/// - `query` returns matches sorted by distance, closest first.
/// - Upsert semantics: inserting an existing id overwrites it.
/// - A filter the backend cannot evaluate is reported as
///   [`DbError::FilterRejected`](crate::DbError::FilterRejected). A filter
///   that matches nothing is not an error; it yields an empty list.
pub trait ChunkCollection: Send + Sync {
    /// Physical name of this collection.
    fn name(&self) -> &str;

    /// Return up to `limit` nearest chunks, optionally restricted by `filter`.
    fn query(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> DbResult<Vec<ChunkMatch>>;

    /// Insert or overwrite chunks.
    fn upsert(&self, chunks: &[ChunkInsert]) -> DbResult<()>;

    /// Delete chunks by id.
    fn delete(&self, ids: &[String]) -> DbResult<()>;

    /// Flush pending writes to persistent storage.
    fn flush(&self) -> DbResult<()>;

    /// Number of chunks in the collection.
    fn len(&self) -> DbResult<usize>;

    /// Check if the collection is empty.
    fn is_empty(&self) -> DbResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Dimension of vectors in this collection.
    fn dimension(&self) -> usize;

    /// Distance metric used by this collection.
    fn metric(&self) -> VectorMetric;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_metric() {
        assert_eq!(VectorMetric::Cosine.as_str(), "cosine");
        assert_eq!(VectorMetric::Dot.as_str(), "dot");
        assert_eq!(VectorMetric::L2.as_str(), "l2");
        assert_eq!(VectorMetric::default(), VectorMetric::Cosine);
    }

    #[test]
    fn test_similarity_from_distance() {
        let m = ChunkMatch::new("rec1_what_happened", "text", ChunkMetadata::default(), 0.25);
        assert!((m.similarity() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_chunk_insert_new() {
        let meta = ChunkMetadata {
            report_id: "7".to_string(),
            ..Default::default()
        };
        let insert = ChunkInsert::new("rec7_causal_factors", vec![0.1, 0.2], "body", meta);
        assert_eq!(insert.id, "rec7_causal_factors");
        assert_eq!(insert.metadata.report_id, "7");
        assert_eq!(insert.vector.len(), 2);
    }
}
