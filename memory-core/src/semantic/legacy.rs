//! File-backed JSON + cosine semantic store (the portable backend).

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{SemanticStore, build_chunks, check_query_dimension, manifest, matches_filters};
use crate::embeddings::{Embedder, cosine_similarity};
use crate::error::Result;
use crate::types::{ChunkHit, DocumentChunk, SemanticStats};

#[derive(Default)]
struct Inner {
    chunks: Vec<DocumentChunk>,
    documents: BTreeSet<String>,
    dimension: Option<usize>,
}

impl Inner {
    fn rebuild_documents(&mut self) {
        self.documents = self.chunks.iter().map(|c| c.document_id.clone()).collect();
        self.dimension = self
            .chunks
            .iter()
            .find(|c| !c.embedding.is_empty())
            .map(|c| c.embedding.len());
    }
}

/// In-process semantic store: every chunk lives in memory, searches scan
/// all of them with cosine similarity, persistence is a JSON manifest.
pub struct LegacyJsonStore {
    index_path: PathBuf,
    embedder: Arc<dyn Embedder>,
    inner: RwLock<Inner>,
}

impl LegacyJsonStore {
    /// Open (or create) the store at `index_path`, restoring any manifest.
    pub fn open(index_path: PathBuf, embedder: Arc<dyn Embedder>) -> Result<Self> {
        std::fs::create_dir_all(&index_path)?;
        let store = Self {
            index_path,
            embedder,
            inner: RwLock::new(Inner::default()),
        };
        store.load()?;
        Ok(store)
    }
}

#[async_trait]
impl SemanticStore for LegacyJsonStore {
    async fn add_document(
        &self,
        content: &str,
        metadata: Map<String, Value>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Vec<String>> {
        let (document_id, chunks) =
            build_chunks(&self.embedder, content, &metadata, chunk_size, chunk_overlap).await?;
        let chunk_ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();

        {
            let mut inner = self.inner.write();
            // Re-ingest replaces the document's previous chunks.
            inner.chunks.retain(|c| c.document_id != document_id);
            inner.chunks.extend(chunks);
            inner.rebuild_documents();
        }
        self.save()?;

        info!(document_id = %document_id, chunks = chunk_ids.len(), "added document");
        Ok(chunk_ids)
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filters: Option<&Map<String, Value>>,
        min_score: f32,
    ) -> Result<Vec<ChunkHit>> {
        let inner = self.inner.read();
        if !check_query_dimension(query, inner.dimension)? {
            return Ok(Vec::new());
        }

        let mut hits: Vec<ChunkHit> = inner
            .chunks
            .iter()
            .filter(|chunk| !chunk.embedding.is_empty())
            .filter(|chunk| filters.is_none_or(|f| matches_filters(&chunk.metadata, f)))
            .filter_map(|chunk| {
                let score = cosine_similarity(query, &chunk.embedding);
                (score >= min_score).then(|| ChunkHit {
                    chunk_id: chunk.chunk_id.clone(),
                    document_id: chunk.document_id.clone(),
                    content: chunk.content.clone(),
                    score,
                    metadata: chunk.metadata.clone(),
                    chunk_index: chunk.chunk_index,
                    citation: chunk.citation(),
                    created_at: chunk.created_at,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);

        debug!(hits = hits.len(), "legacy store search");
        Ok(hits)
    }

    fn get_chunk(&self, chunk_id: &str) -> Option<DocumentChunk> {
        self.inner
            .read()
            .chunks
            .iter()
            .find(|c| c.chunk_id == chunk_id)
            .cloned()
    }

    fn delete_document(&self, document_id: &str) -> Result<usize> {
        let removed = {
            let mut inner = self.inner.write();
            let before = inner.chunks.len();
            inner.chunks.retain(|c| c.document_id != document_id);
            inner.rebuild_documents();
            before - inner.chunks.len()
        };
        self.save()?;
        info!(document_id, removed, "deleted document");
        Ok(removed)
    }

    fn save(&self) -> Result<()> {
        let inner = self.inner.read();
        manifest::save(&self.index_path, &inner.chunks)
    }

    fn load(&self) -> Result<()> {
        let chunks = manifest::load(&self.index_path)?;
        let mut inner = self.inner.write();
        inner.chunks = chunks;
        inner.rebuild_documents();
        Ok(())
    }

    fn stats(&self) -> SemanticStats {
        let inner = self.inner.read();
        let mut by_type = std::collections::BTreeMap::new();
        for chunk in &inner.chunks {
            let doc_type = chunk
                .metadata
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            *by_type.entry(doc_type).or_insert(0) += 1;
        }
        SemanticStats {
            total_chunks: inner.chunks.len(),
            total_documents: inner.documents.len(),
            by_type,
            dimension: inner.dimension,
        }
    }

    fn chunks_snapshot(&self) -> Vec<DocumentChunk> {
        self.inner.read().chunks.clone()
    }
}
