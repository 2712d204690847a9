//! Durable chunk manifest shared by both semantic backends.
//!
//! Layout under the index directory:
//!   chunks.json               — every chunk with its embedding
//!   metadata/documents.json   — per-document metadata snapshot

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Error, Result};
use crate::types::DocumentChunk;

const CHUNKS_FILE: &str = "chunks.json";
const DOCUMENTS_FILE: &str = "metadata/documents.json";

/// Per-chunk keys stripped from the per-document metadata snapshot.
const CHUNK_ONLY_KEYS: [&str; 3] = ["document_id", "chunk_index", "total_chunks"];

pub(crate) fn save(index_path: &Path, chunks: &[DocumentChunk]) -> Result<()> {
    fs::create_dir_all(index_path.join("metadata"))?;

    let chunks_path = index_path.join(CHUNKS_FILE);
    let payload = serde_json::to_vec_pretty(chunks)?;
    fs::write(&chunks_path, payload).map_err(|e| Error::storage_at(&chunks_path, e))?;

    let mut documents: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    for chunk in chunks {
        documents.entry(chunk.document_id.clone()).or_insert_with(|| {
            chunk
                .metadata
                .iter()
                .filter(|(k, _)| !CHUNK_ONLY_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        });
    }

    let documents_path = index_path.join(DOCUMENTS_FILE);
    let payload = serde_json::to_vec_pretty(&documents)?;
    fs::write(&documents_path, payload).map_err(|e| Error::storage_at(&documents_path, e))?;

    Ok(())
}

pub(crate) fn load(index_path: &Path) -> Result<Vec<DocumentChunk>> {
    let chunks_path = index_path.join(CHUNKS_FILE);
    if !chunks_path.exists() {
        return Ok(Vec::new());
    }

    let payload = fs::read(&chunks_path).map_err(|e| Error::storage_at(&chunks_path, e))?;
    match serde_json::from_slice(&payload) {
        Ok(chunks) => Ok(chunks),
        Err(e) => {
            // A corrupt manifest should not brick the store; start empty.
            warn!(path = %chunks_path.display(), error = %e, "failed to parse chunk manifest");
            Ok(Vec::new())
        }
    }
}
