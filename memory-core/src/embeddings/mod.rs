//! Embedding capability: text → fixed-dimension vectors.
//!
//! The engine never talks to a model directly; it goes through the
//! [`Embedder`] trait so the rest of the system stays testable when no real
//! model is available. [`HashEmbedder`] is the deterministic fallback and
//! [`CachedEmbedder`] adds a bounded LRU in front of any provider.

mod cache;
mod fallback;
pub mod similarity;

pub use cache::CachedEmbedder;
pub use fallback::HashEmbedder;
pub use similarity::cosine_similarity;

use async_trait::async_trait;

use crate::error::Result;

/// Capability for converting text into embedding vectors.
///
/// Implementations must be length-preserving for batches and deterministic
/// for a fixed model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. Returns one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| crate::error::Error::DependencyUnavailable(
                "Embedder returned no vector".to_string(),
            ))
    }

    /// Dimension of the vectors this embedder produces.
    fn dimension(&self) -> usize;

    /// Model name or identifier.
    fn model_name(&self) -> &str;
}

/// Normalize a vector to unit length in place.
pub(crate) fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let magnitude = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in &mut vector {
            *x /= magnitude;
        }
    }
    vector
}
