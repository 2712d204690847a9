//! Process-wide semantic store registry.
//!
//! Maps the normalized absolute index path to a single store instance, so
//! every component operating on the same index shares one store while
//! different paths get different instances.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{HnswVectorStore, LegacyJsonStore, SemanticStore};
use crate::config::VectorBackend;
use crate::embeddings::Embedder;
use crate::error::Result;

fn registry() -> &'static Mutex<HashMap<PathBuf, Arc<dyn SemanticStore>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Arc<dyn SemanticStore>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Get or create the semantic store for an index path.
///
/// Paths are canonicalized (symlinks resolved) before lookup, so two
/// spellings of the same directory share one instance. The backend choice
/// applies on first open; later callers receive the existing instance.
pub fn semantic_store_at(
    index_path: &Path,
    backend: VectorBackend,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn SemanticStore>> {
    std::fs::create_dir_all(index_path)?;
    let normalized = std::fs::canonicalize(index_path)?;

    let mut stores = registry().lock();
    if let Some(existing) = stores.get(&normalized) {
        debug!(path = %normalized.display(), "reusing semantic store instance");
        return Ok(Arc::clone(existing));
    }

    info!(path = %normalized.display(), ?backend, "creating semantic store instance");
    let store: Arc<dyn SemanticStore> = match backend {
        VectorBackend::Legacy => Arc::new(LegacyJsonStore::open(normalized.clone(), embedder)?),
        VectorBackend::ChromaDb => Arc::new(HnswVectorStore::open(normalized.clone(), embedder)?),
    };
    stores.insert(normalized, Arc::clone(&store));
    Ok(store)
}

/// Number of distinct store instances currently registered.
#[must_use]
pub fn registered_store_count() -> usize {
    registry().lock().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use tempfile::TempDir;

    #[test]
    fn same_path_yields_same_instance() {
        let dir = TempDir::new().unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
        let path = dir.path().join("index");

        let a = semantic_store_at(&path, VectorBackend::Legacy, Arc::clone(&embedder)).unwrap();
        // A differently-spelled but equivalent path must resolve to the
        // same instance.
        let dotted = dir.path().join(".").join("index");
        let b = semantic_store_at(&dotted, VectorBackend::Legacy, Arc::clone(&embedder)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_paths_yield_different_instances() {
        let dir = TempDir::new().unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());

        let a = semantic_store_at(&dir.path().join("one"), VectorBackend::Legacy, Arc::clone(&embedder))
            .unwrap();
        let b = semantic_store_at(&dir.path().join("two"), VectorBackend::Legacy, embedder).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
