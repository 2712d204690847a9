//! Semantic memory: chunked document storage with vector retrieval.
//!
//! Two interchangeable backends implement [`SemanticStore`]: the portable
//! JSON + cosine [`LegacyJsonStore`] and the HNSW-indexed
//! [`HnswVectorStore`] (config value `chromadb`). Both persist the same
//! chunk manifest, enforce the forbidden-content guard before any write,
//! and skip chunks without embeddings at search time.

pub mod chunking;
pub mod guard;
mod hnsw;
mod legacy;
mod manifest;
mod registry;

pub use hnsw::HnswVectorStore;
pub use legacy::LegacyJsonStore;
pub use registry::{registered_store_count, semantic_store_at};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::embeddings::Embedder;
use crate::error::{Error, Result};
use crate::types::{ChunkHit, DocumentChunk, SemanticStats};

/// Store interface shared by the legacy and HNSW backends.
#[async_trait]
pub trait SemanticStore: Send + Sync {
    /// Chunk, embed, and persist a document. Returns the created chunk ids.
    ///
    /// Re-ingesting a source replaces that document's previous chunks, so
    /// chunk ids stay stable. Rejected documents leave the store untouched.
    async fn add_document(
        &self,
        content: &str,
        metadata: Map<String, Value>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Vec<String>>;

    /// Cosine search over chunks whose metadata satisfies all `filters`.
    ///
    /// Chunks with empty embeddings are skipped. Fails if the query
    /// dimension does not match the dimension recorded for this index.
    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filters: Option<&Map<String, Value>>,
        min_score: f32,
    ) -> Result<Vec<ChunkHit>>;

    /// Fetch a chunk by id.
    fn get_chunk(&self, chunk_id: &str) -> Option<DocumentChunk>;

    /// Delete all chunks of a document. Returns the number removed.
    fn delete_document(&self, document_id: &str) -> Result<usize>;

    /// Persist the store to its index directory.
    fn save(&self) -> Result<()>;

    /// Restore the store from its index directory.
    fn load(&self) -> Result<()>;

    /// Aggregate statistics.
    fn stats(&self) -> SemanticStats;

    /// Snapshot of all chunks (used for per-source aggregation).
    fn chunks_snapshot(&self) -> Vec<DocumentChunk>;
}

/// Stable document id for a source path: `doc_` + 16 hex chars of SHA-256.
///
/// Sources are hashed so re-ingesting the same path yields the same id;
/// documents without a source get a random id.
#[must_use]
pub fn document_id_for_source(source: &str) -> String {
    if source.is_empty() {
        return Uuid::new_v4().to_string();
    }
    let digest = Sha256::digest(source.as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("doc_{hex}")
}

/// Embedding batch size adapted to document size (amortizes dispatch cost).
#[must_use]
pub(crate) fn adaptive_batch_size(chunk_count: usize) -> usize {
    if chunk_count <= 32 {
        32
    } else if chunk_count <= 128 {
        64
    } else {
        128
    }
}

/// Shared ingest path: guard, chunk, embed, assemble.
///
/// Embedding failure is not fatal: affected chunks are stored with empty
/// vectors and stay ineligible for vector search until re-embedded.
pub(crate) async fn build_chunks(
    embedder: &Arc<dyn Embedder>,
    content: &str,
    metadata: &Map<String, Value>,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<(String, Vec<DocumentChunk>)> {
    guard::check_document(content, metadata)?;

    let source = metadata
        .get("source")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let document_id = document_id_for_source(source);

    let texts = chunking::chunk_text(content, chunk_size, chunk_overlap);
    let total_chunks = texts.len();

    let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(total_chunks);
    for batch in texts.chunks(adaptive_batch_size(total_chunks).max(1)) {
        match embedder.embed(batch).await {
            Ok(vectors) => embeddings.extend(vectors),
            Err(e) => {
                warn!(document_id = %document_id, error = %e, "embedding failed, storing chunks without vectors");
                embeddings.extend(std::iter::repeat_n(Vec::new(), batch.len()));
            }
        }
    }

    let now = Utc::now();
    let chunks = texts
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(i, (text, embedding))| {
            let mut chunk_metadata = metadata.clone();
            chunk_metadata.insert("document_id".to_string(), Value::from(document_id.clone()));
            chunk_metadata.insert("chunk_index".to_string(), Value::from(i));
            chunk_metadata.insert("total_chunks".to_string(), Value::from(total_chunks));
            DocumentChunk {
                chunk_id: format!("{document_id}:{i}"),
                document_id: document_id.clone(),
                content: text,
                embedding,
                metadata: chunk_metadata,
                chunk_index: i,
                created_at: now,
            }
        })
        .collect();

    Ok((document_id, chunks))
}

/// Check a chunk's metadata against search filters.
///
/// Filters match on exact equality; a list filter value matches when the
/// chunk's value is a member.
pub(crate) fn matches_filters(metadata: &Map<String, Value>, filters: &Map<String, Value>) -> bool {
    for (key, expected) in filters {
        let Some(actual) = metadata.get(key) else {
            return false;
        };
        match expected {
            Value::Array(options) => {
                if !options.contains(actual) {
                    return false;
                }
            }
            other => {
                if actual != other {
                    return false;
                }
            }
        }
    }
    true
}

/// Guard shared by both backends: refuse reads across a dimension mismatch.
pub(crate) fn check_query_dimension(query: &[f32], recorded: Option<usize>) -> Result<bool> {
    match recorded {
        None => Ok(false),
        Some(dim) if query.len() == dim => Ok(true),
        Some(dim) => Err(Error::InvalidArgument(format!(
            "Embedding dimension mismatch: query has {}, index records {dim}",
            query.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_ids_are_stable() {
        let a = document_id_for_source("docs/api.md");
        let b = document_id_for_source("docs/api.md");
        assert_eq!(a, b);
        assert!(a.starts_with("doc_"));
        assert_ne!(a, document_id_for_source("docs/other.md"));
    }

    #[test]
    fn adaptive_batch_tiers() {
        assert_eq!(adaptive_batch_size(1), 32);
        assert_eq!(adaptive_batch_size(32), 32);
        assert_eq!(adaptive_batch_size(33), 64);
        assert_eq!(adaptive_batch_size(128), 64);
        assert_eq!(adaptive_batch_size(129), 128);
    }

    #[test]
    fn filters_match_equality_and_membership() {
        let metadata: Map<String, Value> =
            [("type".to_string(), json!("code")), ("lang".to_string(), json!("rust"))]
                .into_iter()
                .collect();

        let eq: Map<String, Value> = [("type".to_string(), json!("code"))].into_iter().collect();
        assert!(matches_filters(&metadata, &eq));

        let list: Map<String, Value> =
            [("type".to_string(), json!(["doc", "code"]))].into_iter().collect();
        assert!(matches_filters(&metadata, &list));

        let miss: Map<String, Value> = [("type".to_string(), json!("doc"))].into_iter().collect();
        assert!(!matches_filters(&metadata, &miss));

        let absent: Map<String, Value> = [("owner".to_string(), json!("x"))].into_iter().collect();
        assert!(!matches_filters(&metadata, &absent));
    }
}
