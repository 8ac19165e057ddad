//! incidex engine: index lifecycle and the retrieval entry point.
//!
//! [`EngineContext`] owns everything that used to be process-wide state: the
//! config, the collection store, the lazily loaded embedder and the active
//! index generation. One context is constructed at startup and shared by
//! reference.
//!
//! ## Generations
//!
//! The logical collection `safety_incidents` is served by a physical
//! `safety_incidents-g<n>`. A rebuild embeds every chunk first, writes
//! generation `n + 1`, verifies its count, records it in the meta file, swaps
//! it in and only then drops generation `n`. A failure at any step leaves
//! generation `n` serving. A generation whose count disagrees with the meta
//! file (crash mid-insert) is never reused, and neither is one whose chunk
//! fingerprint differs from the current dataset's.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use incidex_db::vector::{
    check_collection_compatibility, load_collection_meta, physical_name, write_collection_meta,
    ChunkCollection, ChunkInsert, CollectionConfig, CollectionHandle, CollectionMeta,
    CollectionStore,
};
use incidex_model::{EmbeddingConfig, EmbeddingModel};

use crate::chunking::{build_chunks, chunks_fingerprint, Chunk};
use crate::config::EngineConfig;
use crate::dataset::{load_dataset, load_records, validate_columns, IncidentRecord};
use crate::errors::{IncidexError, IncidexResult};
use crate::model_adapter::{load_embedding_model, IntoIncidexResult};
use crate::retriever::{RetrievalResult, RetrieveOptions, Retriever};
use crate::stats::IndexStats;

/// Builds the embedder on first use.
pub type EmbedderFactory =
    Box<dyn Fn(&EmbeddingConfig) -> IncidexResult<Arc<dyn EmbeddingModel>> + Send + Sync>;

/// The generation currently answering queries.
struct ActiveIndex {
    collection: Arc<dyn ChunkCollection>,
    records: Vec<IncidentRecord>,
    meta: CollectionMeta,
}

/// Outcome of [`EngineContext::initialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitReport {
    /// The existing generation was kept.
    pub reused: bool,
    pub collection: String,
    pub generation: u64,
    pub chunks: usize,
    pub records: usize,
}

/// Holds the rebuild flag for its lifetime.
struct RebuildGuard<'a>(&'a AtomicBool);

impl<'a> RebuildGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> IncidexResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| IncidexError::RebuildInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ============================================================================
// EngineContext
// ============================================================================

/// Process-wide engine state.
///
/// Single writer (index builds, serialized by the rebuild flag), many readers
/// (retrieval, stats). Retrieval during a rebuild fails fast with
/// [`IncidexError::RebuildInProgress`] so callers can back off.
pub struct EngineContext {
    config: EngineConfig,
    store: CollectionStore,
    embedder: OnceLock<Arc<dyn EmbeddingModel>>,
    embedder_init: Mutex<()>,
    embedder_factory: EmbedderFactory,
    active: RwLock<Option<ActiveIndex>>,
    rebuilding: AtomicBool,
}

impl EngineContext {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Engine using the configured Candle embedding model.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_embedder_factory(config, Box::new(load_embedding_model))
    }

    /// Engine with a custom embedder factory (tests, alternative providers).
    pub fn with_embedder_factory(config: EngineConfig, factory: EmbedderFactory) -> Self {
        let store = CollectionStore::new(config.index_path.clone(), config.backend.clone());
        Self {
            config,
            store,
            embedder: OnceLock::new(),
            embedder_init: Mutex::new(()),
            embedder_factory: factory,
            active: RwLock::new(None),
            rebuilding: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::Acquire)
    }

    /// Generation currently serving, if any.
    pub fn active_generation(&self) -> Option<u64> {
        self.read_active().as_ref().map(|a| a.meta.generation)
    }

    /// The shared embedder, constructed on first call.
    pub fn embedder(&self) -> IncidexResult<Arc<dyn EmbeddingModel>> {
        if let Some(model) = self.embedder.get() {
            return Ok(Arc::clone(model));
        }

        let _init = self.embedder_init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = self.embedder.get() {
            return Ok(Arc::clone(model));
        }

        info!("Loading embedding model {}", self.config.embedding.model_id);
        let model = (self.embedder_factory)(&self.config.embedding)?;
        info!("Embedding model loaded ({} dimensions)", model.dimension());
        Ok(Arc::clone(self.embedder.get_or_init(|| model)))
    }

    // -------------------------------------------------------------------------
    // Index lifecycle
    // -------------------------------------------------------------------------

    /// Load the dataset and make an index generation active.
    ///
    /// Reuses the current generation when it is compatible, fully populated
    /// and `force` is false; otherwise builds a new one. On failure the
    /// previous generation (if any) keeps serving.
    pub fn initialize(&self, force: bool) -> IncidexResult<InitReport> {
        let _guard = RebuildGuard::acquire(&self.rebuilding)?;
        self.initialize_exclusive(force)
    }

    /// Validate a new dataset, install it at the configured path and rebuild.
    pub fn replace_dataset(&self, csv_path: &Path) -> IncidexResult<InitReport> {
        let _guard = RebuildGuard::acquire(&self.rebuilding)?;

        let table = load_dataset(csv_path)?;
        validate_columns(&table)?;
        info!(
            "Replacing dataset with {} ({} rows)",
            csv_path.display(),
            table.len()
        );

        let target = &self.config.dataset_path;
        if !same_file(csv_path, target) {
            if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::copy(csv_path, target)?;
        }

        self.initialize_exclusive(true)
    }

    /// Attach to the generation recorded on disk without rebuilding or
    /// loading the embedder. Returns `false` when nothing was ever built.
    ///
    /// # Errors
    ///
    /// [`IncidexError::IndexIncompatible`] when the generation was built by
    /// another backend or embedding model than the configured one.
    pub fn attach(&self) -> IncidexResult<bool> {
        let Some(meta) = load_collection_meta(self.store.root(), &self.config.collection)? else {
            return Ok(false);
        };

        // The dimension is only known once the model loads; retrieve checks it.
        let compatibility = check_collection_compatibility(
            &meta,
            self.store.backend(),
            &self.config.embedding.model_id,
            meta.dimension,
        );
        if !compatibility.is_compatible() {
            warn!(
                "Generation '{}' does not fit the configuration: {}",
                meta.physical_name(),
                compatibility
            );
            return Err(IncidexError::index_incompatible(compatibility.to_string()));
        }

        let collection_config = CollectionConfig::new(meta.dimension).with_metric(meta.metric);
        let Some(collection) = self
            .store
            .open_collection(&meta.physical_name(), &collection_config)?
        else {
            warn!(
                "Meta points at missing collection '{}'",
                meta.physical_name()
            );
            return Ok(false);
        };

        let records = load_records(&self.config.dataset_path)?;
        self.install(ActiveIndex {
            collection,
            records,
            meta,
        });
        Ok(true)
    }

    fn initialize_exclusive(&self, force: bool) -> IncidexResult<InitReport> {
        let result = self.build_or_reuse(force);
        match &result {
            Ok(report) if report.reused => {
                info!("Loaded existing index: {} chunks", report.chunks)
            }
            Ok(report) => info!(
                "Indexed {} chunks from {} records into {}",
                report.chunks, report.records, report.collection
            ),
            Err(e) => match self.active_generation() {
                Some(generation) => error!(
                    "Index build failed, generation {} keeps serving: {}",
                    generation, e
                ),
                None => error!("Index build failed, no index is serving: {}", e),
            },
        }
        result
    }

    fn build_or_reuse(&self, force: bool) -> IncidexResult<InitReport> {
        let records = load_records(&self.config.dataset_path)?;
        let chunks = build_chunks(&records, self.config.indexing.min_chunk_chars);
        let fingerprint = chunks_fingerprint(&chunks);
        let embedder = self.embedder()?;
        let collection_config = CollectionConfig::new(embedder.dimension());
        let previous = load_collection_meta(self.store.root(), &self.config.collection)?;

        if !force {
            if let Some(meta) = &previous {
                if let Some(collection) = self.reusable_generation(
                    meta,
                    &chunks,
                    &fingerprint,
                    embedder.model_id(),
                    &collection_config,
                )? {
                    let report = InitReport {
                        reused: true,
                        collection: meta.physical_name(),
                        generation: meta.generation,
                        chunks: chunks.len(),
                        records: records.len(),
                    };
                    self.install(ActiveIndex {
                        collection,
                        records,
                        meta: meta.clone(),
                    });
                    return Ok(report);
                }
            }
        }

        self.rebuild(
            records,
            chunks,
            fingerprint,
            previous,
            embedder.as_ref(),
            &collection_config,
        )
    }

    /// The recorded generation, if it can serve this dataset as-is.
    fn reusable_generation(
        &self,
        meta: &CollectionMeta,
        chunks: &[Chunk],
        fingerprint: &str,
        model_id: &str,
        collection_config: &CollectionConfig,
    ) -> IncidexResult<Option<Arc<dyn ChunkCollection>>> {
        let compatibility = check_collection_compatibility(
            meta,
            self.store.backend(),
            model_id,
            collection_config.dimension,
        );
        if !compatibility.is_compatible() {
            info!("Existing index is incompatible ({}), rebuilding", compatibility);
            return Ok(None);
        }
        if !meta.matches_fingerprint(fingerprint) {
            info!(
                "Dataset changed since generation {} was built, rebuilding",
                meta.generation
            );
            return Ok(None);
        }

        let collection = match self
            .store
            .get_or_create(&meta.physical_name(), collection_config, false)?
        {
            CollectionHandle::Existing(collection) => collection,
            CollectionHandle::Fresh(_) => {
                info!("Existing collection empty, rebuilding");
                return Ok(None);
            }
        };

        let count = collection.len()?;
        if count != meta.chunk_count || count != chunks.len() {
            warn!(
                "Collection '{}' holds {} chunks, meta records {}, dataset yields {}; rebuilding",
                meta.physical_name(),
                count,
                meta.chunk_count,
                chunks.len()
            );
            return Ok(None);
        }
        Ok(Some(collection))
    }

    fn rebuild(
        &self,
        records: Vec<IncidentRecord>,
        chunks: Vec<Chunk>,
        fingerprint: String,
        previous: Option<CollectionMeta>,
        embedder: &dyn EmbeddingModel,
        collection_config: &CollectionConfig,
    ) -> IncidexResult<InitReport> {
        let generation = previous.as_ref().map_or(1, |m| m.generation + 1);
        let name = physical_name(&self.config.collection, generation);

        // Embedding is the slow, failure-prone step; the store is untouched until it succeeds.
        let inserts = self.embed_chunks(embedder, chunks)?;
        let chunk_count = inserts.len();

        let collection = self.store.replace_collection(&name, collection_config)?;
        let meta = CollectionMeta::new(
            &self.config.collection,
            generation,
            self.store.backend(),
            embedder.model_id(),
            collection_config,
        )
        .with_counts(chunk_count, records.len())
        .with_fingerprint(fingerprint);

        let written = self
            .populate(collection.as_ref(), &inserts)
            .and_then(|_| {
                write_collection_meta(self.store.root(), &meta).map_err(IncidexError::from)
            });
        if let Err(e) = written {
            if let Err(drop_err) = self.store.drop_collection(&name) {
                warn!("Failed to drop partial collection '{}': {}", name, drop_err);
            }
            return Err(e);
        }

        self.install(ActiveIndex {
            collection,
            records,
            meta: meta.clone(),
        });
        self.drop_stale_generations(&name);

        Ok(InitReport {
            reused: false,
            collection: name,
            generation,
            chunks: chunk_count,
            records: meta.record_count,
        })
    }

    fn embed_chunks(
        &self,
        embedder: &dyn EmbeddingModel,
        chunks: Vec<Chunk>,
    ) -> IncidexResult<Vec<ChunkInsert>> {
        let batch_size = self.config.embedding.batch_size.max(1);
        let dimension = embedder.dimension();
        info!("Embedding {} chunks", chunks.len());

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for (i, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embedded = embedder.embed(&texts).into_incidex_result()?;
            if embedded.len() != batch.len() || embedded.iter().any(|v| v.len() != dimension) {
                return Err(IncidexError::EmbeddingFailed {
                    reason: format!(
                        "batch {} returned {} vectors, expected {} of dimension {}",
                        i,
                        embedded.len(),
                        batch.len(),
                        dimension
                    ),
                });
            }
            vectors.extend(embedded);
            debug!("Embedded {}/{} chunks", vectors.len(), chunks.len());
        }

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkInsert::new(chunk.id, vector, chunk.text, chunk.metadata))
            .collect())
    }

    fn populate(&self, collection: &dyn ChunkCollection, inserts: &[ChunkInsert]) -> IncidexResult<()> {
        let batch_size = self.config.indexing.insert_batch_size.max(1);
        for batch in inserts.chunks(batch_size) {
            collection.upsert(batch)?;
        }
        collection.flush()?;

        let count = collection.len()?;
        if count != inserts.len() {
            return Err(IncidexError::index_build(format!(
                "collection '{}' holds {} chunks after insert, expected {}",
                collection.name(),
                count,
                inserts.len()
            )));
        }
        Ok(())
    }

    fn install(&self, index: ActiveIndex) {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        *active = Some(index);
    }

    /// Remove every generation of this collection except `keep`.
    fn drop_stale_generations(&self, keep: &str) {
        let prefix = format!("{}-g", self.config.collection);
        let names = match self.store.collection_names() {
            Ok(names) => names,
            Err(e) => {
                warn!("Could not list collections for cleanup: {}", e);
                return;
            }
        };
        for name in names {
            let is_generation = name
                .strip_prefix(&prefix)
                .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
            if is_generation && name != keep {
                if let Err(e) = self.store.drop_collection(&name) {
                    warn!("Failed to drop old generation '{}': {}", name, e);
                }
            }
        }
    }

    fn read_active(&self) -> std::sync::RwLockReadGuard<'_, Option<ActiveIndex>> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Retrieve ranked, deduplicated excerpts for a question.
    ///
    /// # Errors
    ///
    /// - [`IncidexError::RebuildInProgress`] while an index build runs
    /// - [`IncidexError::NotInitialized`] before any successful build
    /// - [`IncidexError::IndexIncompatible`] when the active generation was
    ///   embedded by a different model than the loaded one
    pub fn retrieve(&self, query: &str, opts: RetrieveOptions) -> IncidexResult<RetrievalResult> {
        if self.is_rebuilding() {
            return Err(IncidexError::RebuildInProgress);
        }

        // Held for the whole query so a swap never drops a generation mid-search.
        let active = self.read_active();
        let index = active.as_ref().ok_or(IncidexError::NotInitialized)?;
        let embedder = self.embedder()?;
        if embedder.model_id() != index.meta.embedding_model
            || embedder.dimension() != index.meta.dimension
        {
            return Err(IncidexError::index_incompatible(format!(
                "generation {} holds {}-dimensional vectors from '{}', the loaded model is '{}' ({} dimensions)",
                index.meta.generation,
                index.meta.dimension,
                index.meta.embedding_model,
                embedder.model_id(),
                embedder.dimension()
            )));
        }

        Retriever::new(index.collection.as_ref(), embedder.as_ref(), &self.config.retrieval)
            .retrieve(query, &opts)
    }

    /// Status, counts, years and severity distribution of the active index.
    pub fn stats(&self) -> IncidexResult<IndexStats> {
        let rebuilding = self.is_rebuilding();
        let active = self.read_active();
        match active.as_ref() {
            None => Ok(IndexStats::not_initialized(rebuilding)),
            Some(index) => {
                let chunks = index.collection.len()?;
                Ok(IndexStats::from_records(
                    &index.records,
                    chunks,
                    &index.meta,
                    rebuilding,
                ))
            }
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
