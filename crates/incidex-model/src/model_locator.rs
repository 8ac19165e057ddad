//! Runtime resolution of model directories.
//!
//! Models are disk assets; nothing is downloaded. The base directory is the
//! first existing one of:
//!
//! 1. `$INCIDEX_MODELS_DIR`
//! 2. `~/.incidex/models`
//! 3. `{exe_dir}/models`
//!
//! Inside it, an embedding model lives at `embeddings/<name>/` and must hold
//! `config.json`, `model.safetensors` and `tokenizer.json`.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{ModelError, ModelResult};

/// Environment variable overriding the models directory.
pub const MODELS_DIR_ENV: &str = "INCIDEX_MODELS_DIR";

/// Subdirectory holding embedding models.
pub const EMBEDDINGS_SUBDIR: &str = "embeddings";

/// Files a model directory must contain.
pub const REQUIRED_MODEL_FILES: &[&str] = &["config.json", "model.safetensors", "tokenizer.json"];

/// Locates embedding model directories.
#[derive(Debug, Clone, Default)]
pub struct ModelLocator {
    base_dir: Option<PathBuf>,
}

impl ModelLocator {
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Pin the base directory instead of searching.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    /// Candidate base directories, in search order.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        if let Some(ref base) = self.base_dir {
            return vec![base.clone()];
        }

        let mut paths = Vec::new();
        if let Ok(env_path) = env::var(MODELS_DIR_ENV) {
            if !env_path.is_empty() {
                paths.push(PathBuf::from(env_path));
            }
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".incidex").join("models"));
        }
        if let Some(exe_dir) = env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
        {
            paths.push(exe_dir.join("models"));
        }
        paths
    }

    /// First existing base directory.
    pub fn resolve_base_dir(&self) -> ModelResult<PathBuf> {
        let searched = self.search_paths();
        searched
            .iter()
            .find(|p| p.is_dir())
            .cloned()
            .ok_or(ModelError::ModelsDirectoryNotFound { searched })
    }

    /// Directory of an embedding model, by full id or short name.
    ///
    /// Tries `embeddings/<name>`, then `<full id>`, then `<name>` directly
    /// under the base directory.
    pub fn embedding_model_path(&self, model_id: &str) -> ModelResult<PathBuf> {
        let base = self.resolve_base_dir()?;
        let name = model_name(model_id);

        let candidates = [
            base.join(EMBEDDINGS_SUBDIR).join(name),
            base.join(model_id),
            base.join(name),
        ];

        candidates
            .iter()
            .find(|p| p.join("config.json").is_file())
            .cloned()
            .ok_or_else(|| ModelError::ModelNotFound {
                model_id: model_id.to_string(),
                path: candidates[0].clone(),
            })
    }

    /// Check that a model directory holds every required file.
    pub fn validate_model_dir(&self, path: &Path) -> ModelResult<()> {
        if !path.is_dir() {
            return Err(ModelError::ModelNotFound {
                model_id: path.display().to_string(),
                path: path.to_path_buf(),
            });
        }

        let missing: Vec<&'static str> = REQUIRED_MODEL_FILES
            .iter()
            .copied()
            .filter(|f| !path.join(f).exists())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ModelError::IncompleteModelFiles {
                path: path.to_path_buf(),
                missing,
            })
        }
    }
}

/// Short model name: "sentence-transformers/all-MiniLM-L6-v2" → "all-MiniLM-L6-v2".
pub fn model_name(model_id: &str) -> &str {
    model_id.rsplit('/').next().unwrap_or(model_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn install_model(base: &Path, relative: &str) -> PathBuf {
        let dir = base.join(relative);
        fs::create_dir_all(&dir).unwrap();
        for file in REQUIRED_MODEL_FILES {
            fs::write(dir.join(file), "{}").unwrap();
        }
        dir
    }

    #[test]
    fn test_model_name() {
        assert_eq!(model_name("sentence-transformers/all-MiniLM-L6-v2"), "all-MiniLM-L6-v2");
        assert_eq!(model_name("all-MiniLM-L6-v2"), "all-MiniLM-L6-v2");
    }

    #[test]
    fn test_embedding_model_path_layouts() {
        let temp = TempDir::new().unwrap();
        let nested = install_model(temp.path(), "embeddings/all-MiniLM-L6-v2");
        let locator = ModelLocator::with_base_dir(temp.path());

        assert_eq!(
            locator
                .embedding_model_path("sentence-transformers/all-MiniLM-L6-v2")
                .unwrap(),
            nested
        );

        let flat = install_model(temp.path(), "bge-small");
        assert_eq!(locator.embedding_model_path("BAAI/bge-small").unwrap(), flat);
    }

    #[test]
    fn test_missing_base_dir() {
        let temp = TempDir::new().unwrap();
        let locator = ModelLocator::with_base_dir(temp.path().join("absent"));
        let err = locator.resolve_base_dir().unwrap_err();
        assert!(matches!(err, ModelError::ModelsDirectoryNotFound { ref searched } if searched.len() == 1));
    }

    #[test]
    fn test_missing_model() {
        let temp = TempDir::new().unwrap();
        let locator = ModelLocator::with_base_dir(temp.path());
        match locator.embedding_model_path("nonexistent") {
            Err(ModelError::ModelNotFound { model_id, path }) => {
                assert_eq!(model_id, "nonexistent");
                assert!(path.ends_with("embeddings/nonexistent"));
            }
            other => panic!("expected ModelNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_model_dir() {
        let temp = TempDir::new().unwrap();
        let locator = ModelLocator::with_base_dir(temp.path());
        let complete = install_model(temp.path(), "embeddings/ok");
        assert!(locator.validate_model_dir(&complete).is_ok());

        let partial = temp.path().join("embeddings/partial");
        fs::create_dir_all(&partial).unwrap();
        fs::write(partial.join("config.json"), "{}").unwrap();
        match locator.validate_model_dir(&partial) {
            Err(ModelError::IncompleteModelFiles { missing, .. }) => {
                assert_eq!(missing, vec!["model.safetensors", "tokenizer.json"]);
            }
            other => panic!("expected IncompleteModelFiles, got {:?}", other),
        }
    }
}
