//! Checkpoint loading.
//!
//! A checkpoint is an opaque store of named float tensors. Sources decode one
//! storage format each; [`CheckpointLoader`] resolves model identifiers to a
//! source and caches decoded weight sets so that models built from the same
//! file share them.

mod pict;
mod snapshot;
mod weights;

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::errors::LoadError;

pub use pict::{PictCheckpoint, decode_pict};
pub use snapshot::{SnapshotCheckpoint, decode_snapshot};
pub use weights::{WeightSet, WeightTensor};

/// Something that can produce a complete weight set.
///
/// `load` may block on I/O; async callers go through [`load_checkpoint`].
pub trait CheckpointSource: Send + Sync + Debug {
    fn load(&self) -> Result<WeightSet, LoadError>;

    /// Short human-readable label used in log lines.
    fn describe(&self) -> String;
}

/// A weight set that is already in memory.
#[derive(Debug, Clone)]
pub struct InMemoryCheckpoint {
    weights: Arc<WeightSet>,
}

impl InMemoryCheckpoint {
    pub fn new(weights: WeightSet) -> Self {
        Self {
            weights: Arc::new(weights),
        }
    }
}

impl CheckpointSource for InMemoryCheckpoint {
    fn load(&self) -> Result<WeightSet, LoadError> {
        Ok(self.weights.as_ref().clone())
    }

    fn describe(&self) -> String {
        format!("memory:{} variables", self.weights.len())
    }
}

/// Runs a source on the blocking pool and returns the shared weight set.
pub async fn load_checkpoint(source: Arc<dyn CheckpointSource>) -> Result<Arc<WeightSet>, LoadError> {
    let label = source.describe();
    let weights = tokio::task::spawn_blocking(move || source.load())
        .await
        .map_err(|err| LoadError::Worker {
            message: err.to_string(),
        })??;

    log::info!(
        "Loaded checkpoint {}: {} variables, {} parameters",
        label,
        weights.len(),
        weights.parameter_count()
    );
    Ok(Arc::new(weights))
}

/// Resolves model identifiers to checkpoint sources.
///
/// Identifiers are file paths, relative ones are joined onto the optional
/// root. The extension picks the format: `pict` or `json`.
#[derive(Debug, Default)]
pub struct CheckpointLoader {
    root: Option<PathBuf>,
    cache: Mutex<HashMap<PathBuf, Arc<OnceCell<Arc<WeightSet>>>>>,
}

impl CheckpointLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative identifiers against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn resolve_path(&self, id: &str) -> PathBuf {
        let path = Path::new(id);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Picks the source for an identifier without reading it.
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn CheckpointSource>, LoadError> {
        let path = self.resolve_path(id);
        if !path.exists() {
            return Err(LoadError::NotFound { path });
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("pict") => Ok(Arc::new(PictCheckpoint::new(path))),
            Some("json") => Ok(Arc::new(SnapshotCheckpoint::new(path))),
            _ => Err(LoadError::UnsupportedFormat { path }),
        }
    }

    /// Loads an identifier, reusing a previously decoded weight set when the
    /// same resolved path was loaded before.
    ///
    /// Concurrent loads of one path decode it once and share the result. A
    /// failed decode is not cached.
    pub async fn load(&self, id: &str) -> Result<Arc<WeightSet>, LoadError> {
        let path = self.resolve_path(id);
        let cell = Arc::clone(self.cache.lock().entry(path.clone()).or_default());
        if cell.initialized() {
            log::debug!("Checkpoint cache hit for {}", path.display());
        }

        let weights = cell.get_or_try_init(|| self.decode(id)).await?;
        Ok(Arc::clone(weights))
    }

    async fn decode(&self, id: &str) -> Result<Arc<WeightSet>, LoadError> {
        let source = self.resolve(id)?;
        load_checkpoint(source).await
    }

    /// Number of weight sets currently cached.
    pub fn cached(&self) -> usize {
        self.cache
            .lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_snapshot(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(
            &path,
            r#"{"variables": {"a": {"shape": [2], "data": [1.0, 2.0]}}}"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_resolve_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), "model.json");
        std::fs::write(dir.path().join("model.pict"), b"").unwrap();
        std::fs::write(dir.path().join("model.bin"), b"").unwrap();

        let loader = CheckpointLoader::with_root(dir.path());
        assert!(loader.resolve("model.json").unwrap().describe().starts_with("snapshot:"));
        assert!(loader.resolve("model.pict").unwrap().describe().starts_with("pict:"));
        assert!(matches!(
            loader.resolve("model.bin"),
            Err(LoadError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            loader.resolve("missing.pict"),
            Err(LoadError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_loader_caches_by_path() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), "model.json");
        let loader = CheckpointLoader::with_root(dir.path());

        let first = loader.load("model.json").await.unwrap();
        let second = loader.load("model.json").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.cached(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_decode() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), "model.json");
        let loader = CheckpointLoader::with_root(dir.path());

        let (first, second) = tokio::join!(loader.load("model.json"), loader.load("model.json"));

        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
        assert_eq!(loader.cached(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{").unwrap();
        let loader = CheckpointLoader::with_root(dir.path());

        assert!(matches!(
            loader.load("broken.json").await,
            Err(LoadError::Json(_))
        ));
        assert_eq!(loader.cached(), 0);
    }

    #[tokio::test]
    async fn test_in_memory_source() {
        let weights = WeightSet::new().with("x", WeightTensor::filled(vec![3], 1.0));
        let loaded = load_checkpoint(Arc::new(InMemoryCheckpoint::new(weights.clone())))
            .await
            .unwrap();
        assert_eq!(*loaded, weights);
    }
}
