//! Bounded LRU cache in front of an embedding provider.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use super::Embedder;
use crate::error::Result;

/// Minimum cache capacity; smaller requests are rounded up.
const MIN_CAPACITY: usize = 1_000;

/// Caching wrapper around any [`Embedder`].
///
/// Results are keyed by exact text. Cache access is mutex-protected; the
/// inner provider is only consulted for misses, and misses within one batch
/// are embedded together to amortize dispatch cost.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachedEmbedder {
    #[must_use]
    pub fn new(inner: Arc<dyn Embedder>, capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut miss_indices = Vec::new();
        let mut miss_texts = Vec::new();

        {
            let mut cache = self.cache.lock();
            for (i, text) in texts.iter().enumerate() {
                if let Some(vector) = cache.get(text) {
                    results[i] = Some(vector.clone());
                } else {
                    miss_indices.push(i);
                    miss_texts.push(text.clone());
                }
            }
        }

        if !miss_texts.is_empty() {
            debug!(misses = miss_texts.len(), total = texts.len(), "embedding cache misses");
            let fresh = self.inner.embed(&miss_texts).await?;
            let mut cache = self.cache.lock();
            for (idx, vector) in miss_indices.into_iter().zip(fresh) {
                cache.put(texts[idx].clone(), vector.clone());
                results[idx] = Some(vector);
            }
        }

        Ok(results.into_iter().map(Option::unwrap_or_default).collect())
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
