//! HNSW-indexed semantic store (the `chromadb` backend).
//!
//! Chunk payloads persist in the same JSON manifest as the legacy backend;
//! the cosine HNSW index is an in-memory acceleration structure rebuilt
//! from stored embeddings on load and after mutations. Search over-fetches
//! from the index before metadata filtering, so results are semantically
//! equivalent to the legacy full scan.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use hnsw_rs::prelude::*;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{SemanticStore, build_chunks, check_query_dimension, manifest, matches_filters};
use crate::embeddings::Embedder;
use crate::error::Result;
use crate::types::{ChunkHit, DocumentChunk, SemanticStats};

/// Graph connectivity per layer.
const MAX_NB_CONNECTION: usize = 16;
/// Construction-time beam width.
const EF_CONSTRUCTION: usize = 200;
/// Over-fetch floor before metadata filtering.
const SEARCH_FLOOR: usize = 32;

struct Index {
    hnsw: Hnsw<'static, f32, DistCosine>,
    /// data id → position in `Inner::chunks`
    slots: Vec<usize>,
}

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

    fn build_index(&self) -> Option<Index> {
        let embedded: Vec<usize> = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.embedding.is_empty())
            .map(|(i, _)| i)
            .collect();
        if embedded.is_empty() {
            return None;
        }

        let capacity = embedded.len().max(SEARCH_FLOOR);
        let max_layer = 16.min(((capacity as f32).ln().ceil() as usize).max(1));
        let hnsw = Hnsw::<f32, DistCosine>::new(
            MAX_NB_CONNECTION,
            capacity,
            max_layer,
            EF_CONSTRUCTION,
            DistCosine {},
        );

        let mut slots = Vec::with_capacity(embedded.len());
        for (data_id, chunk_idx) in embedded.into_iter().enumerate() {
            hnsw.insert_slice((self.chunks[chunk_idx].embedding.as_slice(), data_id));
            slots.push(chunk_idx);
        }

        Some(Index { hnsw, slots })
    }
}

/// Persistent HNSW cosine store.
pub struct HnswVectorStore {
    index_path: PathBuf,
    embedder: Arc<dyn Embedder>,
    inner: RwLock<Inner>,
    index: RwLock<Option<Index>>,
}

impl HnswVectorStore {
    /// Open (or create) the store at `index_path`, restoring any manifest
    /// and rebuilding the vector index from stored embeddings.
    pub fn open(index_path: PathBuf, embedder: Arc<dyn Embedder>) -> Result<Self> {
        std::fs::create_dir_all(&index_path)?;
        let store = Self {
            index_path,
            embedder,
            inner: RwLock::new(Inner::default()),
            index: RwLock::new(None),
        };
        store.load()?;
        Ok(store)
    }

    fn rebuild_index(&self) {
        let rebuilt = self.inner.read().build_index();
        *self.index.write() = rebuilt;
    }
}

#[async_trait]
impl SemanticStore for HnswVectorStore {
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
            inner.chunks.retain(|c| c.document_id != document_id);
            inner.chunks.extend(chunks);
            inner.rebuild_documents();
        }
        self.rebuild_index();
        self.save()?;

        info!(document_id = %document_id, chunks = chunk_ids.len(), "added document to hnsw store");
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

        let index_guard = self.index.read();
        let Some(index) = index_guard.as_ref() else {
            return Ok(Vec::new());
        };

        let knn = (top_k * 4).max(SEARCH_FLOOR).min(index.slots.len());
        let ef_search = (knn * 2).max(EF_CONSTRUCTION / 4);
        let neighbours = index.hnsw.search(query, knn, ef_search);

        let mut hits: Vec<ChunkHit> = neighbours
            .into_iter()
            .filter_map(|n| {
                let chunk = inner.chunks.get(*index.slots.get(n.d_id)?)?;
                if let Some(f) = filters {
                    if !matches_filters(&chunk.metadata, f) {
                        return None;
                    }
                }
                // DistCosine yields 1 - cos; invert back to similarity.
                let score = 1.0 - n.distance;
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

        debug!(hits = hits.len(), "hnsw store search");
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
        self.rebuild_index();
        self.save()?;
        info!(document_id, removed, "deleted document from hnsw store");
        Ok(removed)
    }

    fn save(&self) -> Result<()> {
        let inner = self.inner.read();
        manifest::save(&self.index_path, &inner.chunks)
    }

    fn load(&self) -> Result<()> {
        let chunks = manifest::load(&self.index_path)?;
        {
            let mut inner = self.inner.write();
            inner.chunks = chunks;
            inner.rebuild_documents();
        }
        self.rebuild_index();
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
