//! # incidex-db
//!
//! Storage layer for incidex - chunk collections and dataset tables.
//!
//! This crate keeps the "heavy" storage dependencies (LanceDB, Arrow) out of
//! `incidex-core`, so the retrieval engine itself compiles fast and can be
//! tested against the simple file backend.
//!
//! ## Architecture
//!
//! ```text
//! incidex-cli → incidex-core → (traits)
//!                   ↑
//!              incidex-db    (chunk collections, metadata filters, CSV tables)
//!              incidex-model (embeddings)
//! ```
//!
//! ## Features
//!
//! - `lancedb` (default): LanceDB collections with ANN search
//! - `simple`: JSONL collections with linear scan, for tests and tiny corpora
//!
//! ## Modules
//!
//! - `vector`: chunk metadata schema, filter language, collection backends
//! - `table`: raw CSV dataset tables
//!
//! ## Usage
//!
//! ```ignore
//! use incidex_db::vector::{CollectionStore, CollectionConfig, MetadataFilter};
//!
//! let store = CollectionStore::new("data/incident_index", "lancedb");
//! let collection = store.replace_collection("safety_incidents-g1", &CollectionConfig::new(384))?;
//! collection.upsert(&chunks)?;
//!
//! let filter = MetadataFilter::equals(FilterField::City, "Vancouver");
//! let hits = collection.query(&embedding, 24, Some(&filter))?;
//! ```

pub mod error;
pub mod table;
pub mod vector;

pub use error::{DbError, DbResult};
