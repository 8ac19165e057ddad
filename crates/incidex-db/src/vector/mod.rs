//! Chunk collections for incidex-db.
//!
//! This module provides the vector storage used by the retrieval engine:
//! the flat chunk metadata schema, the metadata filter language, and the
//! collection backends with their generation lifecycle.
//!
//! ## Available Backends
//!
//! - `lancedb` (default): LanceDB with ANN search
//! - `simple`: JSONL file backend for testing/small collections
//!
//! ## Usage
//!
//! ```ignore
//! use incidex_db::vector::{CollectionConfig, CollectionStore};
//!
//! let store = CollectionStore::new("/path/to/index", "simple");
//! let handle = store.get_or_create("safety_incidents-g1", &CollectionConfig::new(384), false)?;
//!
//! // Insert chunks
//! handle.collection().upsert(&inserts)?;
//!
//! // Query nearest chunks
//! let matches = handle.collection().query(&embedding, 10, None)?;
//! ```

mod backend;
mod config;
mod metadata;
mod traits;

// Re-export main types
pub use config::{
    check_collection_compatibility, load_collection_meta, physical_name, write_collection_meta,
    CollectionCompatibility, CollectionConfig, CollectionMeta, COLLECTION_META_SUFFIX,
    DEFAULT_BACKEND, LANCEDB_TABLE_NAME, SCHEMA_VERSION,
};
pub use metadata::{ChunkMetadata, FilterField, FilterValue, MetadataFilter};
pub use traits::{ChunkCollection, ChunkInsert, ChunkMatch, VectorMetric};

// Re-export the collection lifecycle
pub use backend::{available_backends, CollectionHandle, CollectionStore};

// Re-export backends
#[cfg(feature = "lancedb")]
pub use backend::LanceDbCollection;

#[cfg(feature = "simple")]
pub use backend::SimpleFileCollection;
