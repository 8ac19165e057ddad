//! Simple file-based collection backend.
//!
//! Stores chunks in a JSONL file and answers queries with a linear scan.
//! Intended for tests and small corpora where a full vector database is not
//! justified.

use super::super::config::CollectionConfig;
use super::super::metadata::{ChunkMetadata, MetadataFilter};
use super::super::traits::{ChunkCollection, ChunkInsert, ChunkMatch, VectorMetric};
use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, trace, warn};

/// Filename for the JSONL data file.
const DATA_FILENAME: &str = "chunks.jsonl";

/// A stored chunk entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    id: String,
    vector: Vec<f32>,
    text: String,
    metadata: ChunkMetadata,
}

impl From<&ChunkInsert> for StoredChunk {
    fn from(insert: &ChunkInsert) -> Self {
        Self {
            id: insert.id.clone(),
            vector: insert.vector.clone(),
            text: insert.text.clone(),
            metadata: insert.metadata.clone(),
        }
    }
}

/// Simple file-based chunk collection.
///
/// Chunks are kept in id order so equal-distance matches come back in a
/// stable order.
pub struct SimpleFileCollection {
    name: String,
    path: PathBuf,
    dimension: usize,
    metric: VectorMetric,
    chunks: RwLock<BTreeMap<String, StoredChunk>>,
}

impl SimpleFileCollection {
    /// Open (or start) a collection in `path`.
    pub fn open(name: &str, path: &Path, config: &CollectionConfig) -> DbResult<Self> {
        debug!("Opening SimpleFileCollection '{}' at {:?}", name, path);

        let collection = Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            dimension: config.dimension,
            metric: config.metric,
            chunks: RwLock::new(BTreeMap::new()),
        };

        let data_path = path.join(DATA_FILENAME);
        if data_path.exists() {
            collection.load_from_file(&data_path)?;
        }

        Ok(collection)
    }

    fn load_from_file(&self, path: &Path) -> DbResult<()> {
        let reader = BufReader::new(File::open(path)?);

        let mut chunks = self
            .chunks
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))?;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredChunk>(&line) {
                Ok(stored) => {
                    chunks.insert(stored.id.clone(), stored);
                }
                Err(e) => {
                    // A torn final line after a crash; the collection's count
                    // will no longer match its meta and it gets rebuilt.
                    warn!("Skipping unreadable line {} in {:?}: {}", line_num + 1, path, e);
                }
            }
        }

        debug!("Loaded {} chunks", chunks.len());
        Ok(())
    }

    fn save_to_file(&self) -> DbResult<()> {
        let data_path = self.path.join(DATA_FILENAME);

        let chunks = self
            .chunks
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))?;

        let mut writer = BufWriter::new(File::create(&data_path)?);
        for stored in chunks.values() {
            serde_json::to_writer(&mut writer, stored)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        trace!("Saved {} chunks to {:?}", chunks.len(), data_path);
        Ok(())
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.metric {
            VectorMetric::Cosine => 1.0 - cosine_similarity(a, b),
            VectorMetric::Dot => -dot_product(a, b),
            VectorMetric::L2 => euclidean_distance(a, b),
        }
    }
}

impl ChunkCollection for SimpleFileCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> DbResult<Vec<ChunkMatch>> {
        if let Some(f) = filter {
            f.validate()?;
        }
        if embedding.len() != self.dimension {
            return Err(DbError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        let chunks = self
            .chunks
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))?;

        let mut scored: Vec<(f32, &StoredChunk)> = chunks
            .values()
            .filter(|c| filter.map(|f| f.matches(&c.metadata)).unwrap_or(true))
            .map(|c| (self.distance(embedding, &c.vector), c))
            .collect();

        // Closest first; stable so ties keep id order
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let results: Vec<ChunkMatch> = scored
            .into_iter()
            .take(limit)
            .map(|(distance, c)| ChunkMatch::new(&c.id, &c.text, c.metadata.clone(), distance))
            .collect();

        trace!("Found {} matches in '{}'", results.len(), self.name);
        Ok(results)
    }

    fn upsert(&self, chunks: &[ChunkInsert]) -> DbResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        debug!("Upserting {} chunks into '{}'", chunks.len(), self.name);

        let mut stored = self
            .chunks
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))?;

        for insert in chunks {
            if insert.vector.len() != self.dimension {
                return Err(DbError::DimensionMismatch {
                    expected: self.dimension,
                    actual: insert.vector.len(),
                });
            }
            stored.insert(insert.id.clone(), StoredChunk::from(insert));
        }

        // Persist immediately
        drop(stored);
        self.save_to_file()
    }

    fn delete(&self, ids: &[String]) -> DbResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut stored = self
            .chunks
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))?;
        for id in ids {
            stored.remove(id);
        }

        drop(stored);
        self.save_to_file()
    }

    fn flush(&self) -> DbResult<()> {
        self.save_to_file()
    }

    fn len(&self) -> DbResult<usize> {
        let stored = self
            .chunks
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))?;
        Ok(stored.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> VectorMetric {
        self.metric
    }
}

// ============================================================================
// Similarity Functions
// ============================================================================

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

// ============================================================================
// Tests
// ============================================================================
