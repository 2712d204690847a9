//! Deterministic fallback embedder.
//!
//! Used when no real model is configured or reachable, so ingestion,
//! retrieval, and the test suite keep working. Vectors are derived from the
//! SHA-256 digest of the text and normalized to the unit sphere; they are
//! stable across runs but carry no semantic signal.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{Embedder, normalize};
use crate::error::Result;

/// Default dimension of fallback embeddings.
pub const FALLBACK_DIMENSION: usize = 128;

/// SHA-256-derived pseudo-embedding provider.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    name: String,
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(FALLBACK_DIMENSION)
    }
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            name: "hash-fallback".to_string(),
            dimension,
        }
    }

    /// Generate the deterministic embedding for a text.
    #[must_use]
    pub fn embedding_for(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());

        // Eight 32-bit words from the digest, cycled across the dimension.
        let words: Vec<u32> = digest
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let mut vector = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            let word = words[i % words.len()];
            // Mix the position in so cycles don't repeat verbatim.
            let mixed = word.rotate_left((i / words.len()) as u32 & 31);
            let value = (f64::from(mixed) / f64::from(u32::MAX)) * 2.0 - 1.0;
            vector.push(value as f32);
        }

        normalize(vector)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embedding_for(t)).collect())
    }

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embedding_for(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
