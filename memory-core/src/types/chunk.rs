use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Non-authoritative slice of a document in semantic memory.
///
/// `document_id` is a stable hash of the source path, so re-ingesting the
/// same path yields the same ids. `chunk_id = {document_id}:{chunk_index}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Stable chunk id (`{document_id}:{chunk_index}`)
    pub chunk_id: String,
    /// Stable parent document id
    pub document_id: String,
    /// Chunk text (overlap-prefixed for indexes > 0)
    pub content: String,
    /// Embedding vector; empty when embedding failed (ineligible for search)
    pub embedding: Vec<f32>,
    /// Document metadata plus `document_id`, `chunk_index`, `total_chunks`
    pub metadata: Map<String, Value>,
    /// Position of this chunk in its document
    pub chunk_index: usize,
    /// Creation timestamp (RFC 3339 UTC)
    pub created_at: DateTime<Utc>,
}

impl DocumentChunk {
    /// Citation string identifying the chunk's origin.
    #[must_use]
    pub fn citation(&self) -> String {
        let source = self
            .metadata
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        format!("{source}:{}", self.chunk_index)
    }

    /// Source path recorded in metadata, if any.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }
}

/// One search hit from a semantic store, annotated with its score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    /// Cosine similarity against the query vector
    pub score: f32,
    pub metadata: Map<String, Value>,
    pub chunk_index: usize,
    /// `{source}:{chunk_index}`
    pub citation: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregate statistics for a semantic index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticStats {
    pub total_chunks: usize,
    pub total_documents: usize,
    pub by_type: std::collections::BTreeMap<String, usize>,
    /// Embedding dimension recorded at first write, if any
    pub dimension: Option<usize>,
}
