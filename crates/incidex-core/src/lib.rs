//! # incidex-core
//!
//! Retrieval engine for workplace safety-incident reports.
//!
//! This crate turns a CSV of incident reports into a searchable chunk index
//! and answers natural-language questions with ranked, cited excerpts. It is
//! consumed by the `incidex` CLI and by anything that needs grounded context
//! for a language model.
//!
//! ## Main Types
//!
//! - [`EngineContext`] – owns the config, the collection store, the lazily
//!   loaded embedder and the active index generation
//! - [`IncidexError`] – domain-specific error type
//!
//! ## Modules
//!
//! - [`config`] – YAML configuration
//! - [`dataset`] – CSV loading and record normalization
//! - [`chunking`] – one chunk per substantive narrative section
//! - [`query`] – filter extraction and domain query expansion
//! - [`retriever`] – filtered search, blending, reranking, dedup
//! - [`context`] – source blocks and citations for the answer step
//! - [`engine`] – index lifecycle and the retrieval entry point
//! - [`stats`] – index status report
//!
//! ## Example
//!
//! ```ignore
//! use incidex_core::{EngineConfig, EngineContext, RetrieveOptions};
//!
//! let engine = EngineContext::new(EngineConfig::load_default()?);
//! engine.initialize(false)?;
//!
//! let result = engine.retrieve("what happened in Vancouver in 2023", RetrieveOptions::default())?;
//! for hit in &result.hits {
//!     println!("{:.3} {}", hit.score, hit.metadata.title);
//! }
//! ```

// Modules
pub mod chunking;
pub mod config;
pub mod context;
pub mod dataset;
pub mod engine;
pub mod errors;
pub mod model_adapter;
pub mod query;
pub mod retriever;
pub mod stats;

// Re-exports for convenience
pub use chunking::{build_chunks, Chunk, SECTIONS};
pub use config::{ContextConfig, EngineConfig, IndexingConfig, RetrievalConfig};
pub use context::{
    auto_detected_note, build_user_prompt, format_context, summarize_sources, SourceSummary,
};
pub use dataset::{load_records, normalize_table, IncidentRecord, REQUIRED_COLUMNS};
pub use engine::{EmbedderFactory, EngineContext, InitReport};
pub use errors::{IncidexError, IncidexResult};
pub use query::{ParsedFacts, QueryUnderstanding};
pub use retriever::{FilterOutcome, RetrievalResult, RetrieveOptions, Retriever, ScoredHit};
pub use stats::{IndexStats, IndexStatus};
