//! Collection backends and the collection lifecycle.
//!
//! ## Available Backends
//!
//! - `lancedb` (default): LanceDB table per physical collection
//! - `simple`: JSONL file per physical collection, linear scan
//!
//! Every physical collection lives in its own directory under the store
//! root, so dropping a collection is a directory removal regardless of
//! backend.

#[cfg(feature = "lancedb")]
mod lancedb;

#[cfg(feature = "simple")]
mod simple;

#[cfg(feature = "lancedb")]
pub use self::lancedb::LanceDbCollection;

#[cfg(feature = "simple")]
pub use simple::SimpleFileCollection;

use super::config::{CollectionConfig, DEFAULT_BACKEND};
use super::traits::ChunkCollection;
use crate::error::{DbError, DbResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of [`CollectionStore::get_or_create`].
pub enum CollectionHandle {
    /// A non-empty collection already existed and was opened.
    Existing(Arc<dyn ChunkCollection>),
    /// The collection was missing, empty or forced, and was created empty.
    Fresh(Arc<dyn ChunkCollection>),
}

impl CollectionHandle {
    /// The underlying collection, whichever way it was obtained.
    pub fn collection(&self) -> &Arc<dyn ChunkCollection> {
        match self {
            CollectionHandle::Existing(c) | CollectionHandle::Fresh(c) => c,
        }
    }

    /// Whether the collection was freshly created.
    pub fn is_fresh(&self) -> bool {
        matches!(self, CollectionHandle::Fresh(_))
    }
}

/// Directory of physical collections served by one backend.
#[derive(Debug, Clone)]
pub struct CollectionStore {
    root: PathBuf,
    backend: String,
}

impl CollectionStore {
    /// Create a store rooted at `root` using the named backend.
    pub fn new(root: impl Into<PathBuf>, backend: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            backend: backend.into(),
        }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Backend name.
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Directory holding a physical collection.
    pub fn collection_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Whether a physical collection exists on disk.
    pub fn exists(&self, name: &str) -> bool {
        self.collection_path(name).is_dir()
    }

    /// Names of all physical collections in the store.
    pub fn collection_names(&self) -> DbResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Open an existing collection, or `None` if it does not exist.
    pub fn open_collection(
        &self,
        name: &str,
        config: &CollectionConfig,
    ) -> DbResult<Option<Arc<dyn ChunkCollection>>> {
        if !self.exists(name) {
            debug!("Collection '{}' not found under {:?}", name, self.root);
            return Ok(None);
        }
        self.open_backend(name, config).map(Some)
    }

    /// Drop the collection if it exists, then create it empty.
    pub fn replace_collection(
        &self,
        name: &str,
        config: &CollectionConfig,
    ) -> DbResult<Arc<dyn ChunkCollection>> {
        self.drop_collection(name)?;
        info!("Creating collection '{}' ({} backend)", name, self.backend);
        fs::create_dir_all(self.collection_path(name))?;
        self.open_backend(name, config)
    }

    /// Return the existing collection if it is non-empty and `force` is not
    /// set; otherwise replace it with a fresh empty one.
    pub fn get_or_create(
        &self,
        name: &str,
        config: &CollectionConfig,
        force: bool,
    ) -> DbResult<CollectionHandle> {
        if !force {
            if let Some(existing) = self.open_collection(name, config)? {
                if !existing.is_empty()? {
                    debug!("Reusing non-empty collection '{}'", name);
                    return Ok(CollectionHandle::Existing(existing));
                }
                info!("Collection '{}' exists but is empty, recreating", name);
            }
        }
        Ok(CollectionHandle::Fresh(self.replace_collection(name, config)?))
    }

    /// Remove a physical collection. Missing collections are not an error.
    pub fn drop_collection(&self, name: &str) -> DbResult<()> {
        let path = self.collection_path(name);
        if path.exists() {
            info!("Dropping collection '{}'", name);
            fs::remove_dir_all(&path)
                .map_err(|e| DbError::collection_io(&path, format!("Failed to drop: {}", e)))?;
        }
        Ok(())
    }

    fn open_backend(
        &self,
        name: &str,
        config: &CollectionConfig,
    ) -> DbResult<Arc<dyn ChunkCollection>> {
        let path = self.collection_path(name);

        match self.backend.as_str() {
            #[cfg(feature = "lancedb")]
            "lancedb" => Ok(Arc::new(LanceDbCollection::open(name, &path, config)?)),

            #[cfg(feature = "simple")]
            "simple" => Ok(Arc::new(SimpleFileCollection::open(name, &path, config)?)),

            backend => Err(DbError::Config {
                message: format!(
                    "Backend '{}' is not available. Available backends: {} (default: {})",
                    backend,
                    available_backends().join(", "),
                    DEFAULT_BACKEND
                ),
            }),
        }
    }
}

/// Get a list of available backend names.
#[allow(clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<&'static str> {
    let mut backends = Vec::new();

    #[cfg(feature = "lancedb")]
    backends.push("lancedb");

    #[cfg(feature = "simple")]
    backends.push("simple");

    backends
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, feature = "simple"))]
mod tests {
    use super::*;
    use crate::vector::metadata::ChunkMetadata;
    use crate::vector::traits::ChunkInsert;
    use tempfile::TempDir;

    fn insert(id: &str) -> ChunkInsert {
        ChunkInsert::new(id, vec![1.0, 0.0, 0.0], "text", ChunkMetadata::default())
    }

    #[test]
    fn test_available_backends_includes_simple() {
        assert!(available_backends().contains(&"simple"));
    }

    #[test]
    fn test_unknown_backend() {
        let temp = TempDir::new().unwrap();
        let store = CollectionStore::new(temp.path(), "faiss");
        let result = store.replace_collection("c-g1", &CollectionConfig::new(3));
        assert!(matches!(result, Err(DbError::Config { .. })));
    }

    #[test]
    fn test_replace_collection_drops_previous_contents() {
        let temp = TempDir::new().unwrap();
        let store = CollectionStore::new(temp.path(), "simple");
        let config = CollectionConfig::new(3);

        let first = store.replace_collection("c-g1", &config).unwrap();
        first.upsert(&[insert("a"), insert("b")]).unwrap();
        assert_eq!(first.len().unwrap(), 2);

        let second = store.replace_collection("c-g1", &config).unwrap();
        assert_eq!(second.len().unwrap(), 0);
    }

    #[test]
    fn test_get_or_create() {
        let temp = TempDir::new().unwrap();
        let store = CollectionStore::new(temp.path(), "simple");
        let config = CollectionConfig::new(3);

        let handle = store.get_or_create("c-g1", &config, false).unwrap();
        assert!(handle.is_fresh());
        handle.collection().upsert(&[insert("a")]).unwrap();

        let handle = store.get_or_create("c-g1", &config, false).unwrap();
        assert!(!handle.is_fresh());
        assert_eq!(handle.collection().len().unwrap(), 1);

        let handle = store.get_or_create("c-g1", &config, true).unwrap();
        assert!(handle.is_fresh());
        assert_eq!(handle.collection().len().unwrap(), 0);
    }

    #[test]
    fn test_open_missing_and_drop() {
        let temp = TempDir::new().unwrap();
        let store = CollectionStore::new(temp.path(), "simple");
        let config = CollectionConfig::new(3);

        assert!(store.open_collection("c-g1", &config).unwrap().is_none());
        store.replace_collection("c-g1", &config).unwrap();
        store.replace_collection("c-g2", &config).unwrap();
        assert_eq!(store.collection_names().unwrap(), vec!["c-g1", "c-g2"]);

        store.drop_collection("c-g1").unwrap();
        store.drop_collection("c-g1").unwrap();
        assert_eq!(store.collection_names().unwrap(), vec!["c-g2"]);
    }
}
