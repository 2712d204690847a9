//! Ingestion pipeline: read → decode → chunk → embed → add.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::semantic::SemanticStore;
use crate::types::DocType;

/// Extensions treated as code when inferring a document type.
const CODE_EXTENSIONS: [&str; 15] = [
    "py", "js", "ts", "java", "go", "rs", "c", "cpp", "h", "sh", "rb", "swift", "kt", "cs", "php",
];

/// Ingestion front-end for a semantic store.
pub struct Ingestor {
    store: Arc<dyn SemanticStore>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Ingestor {
    #[must_use]
    pub fn new(store: Arc<dyn SemanticStore>, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            store,
            chunk_size,
            chunk_overlap,
        }
    }

    /// Ingest plain text. Returns the created chunk ids.
    pub async fn ingest_text(
        &self,
        text: &str,
        mut metadata: Map<String, Value>,
        chunk_size: Option<usize>,
        chunk_overlap: Option<usize>,
    ) -> Result<Vec<String>> {
        if !metadata.contains_key("type") {
            metadata.insert("type".to_string(), Value::from(DocType::Doc.to_string()));
        }

        let chunk_ids = self
            .store
            .add_document(
                text,
                metadata,
                chunk_size.unwrap_or(self.chunk_size),
                chunk_overlap.unwrap_or(self.chunk_overlap),
            )
            .await?;
        info!(chunks = chunk_ids.len(), "ingested text");
        Ok(chunk_ids)
    }

    /// Ingest a file, decoding it through the encoding fallback chain and
    /// inferring `type` from the extension when the caller didn't set one.
    pub async fn ingest_file(
        &self,
        path: &Path,
        metadata: Option<Map<String, Value>>,
        chunk_size: Option<usize>,
        chunk_overlap: Option<usize>,
    ) -> Result<Vec<String>> {
        if !path.is_file() {
            return Err(Error::NotFound(format!("File not found: {}", path.display())));
        }

        let content = read_text_file(path)?;
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        let mut file_metadata = metadata.unwrap_or_default();
        file_metadata.insert("source".to_string(), Value::from(path.to_string_lossy().into_owned()));
        if !file_metadata.contains_key("type") {
            file_metadata.insert("type".to_string(), Value::from(infer_type(path).to_string()));
        }
        if let Some(name) = path.file_name() {
            file_metadata.insert("filename".to_string(), Value::from(name.to_string_lossy().into_owned()));
        }
        file_metadata.insert("size".to_string(), Value::from(size));

        let chunk_ids = self
            .store
            .add_document(
                &content,
                file_metadata,
                chunk_size.unwrap_or(self.chunk_size),
                chunk_overlap.unwrap_or(self.chunk_overlap),
            )
            .await?;
        info!(path = %path.display(), chunks = chunk_ids.len(), "ingested file");
        Ok(chunk_ids)
    }

    /// Ingest every matching file under a directory, skipping hidden
    /// directories. Per-file failures are logged and skipped so one bad
    /// file never aborts the walk.
    pub async fn ingest_directory(
        &self,
        dir: &Path,
        metadata: Option<Map<String, Value>>,
        pattern: Option<&str>,
    ) -> Result<BTreeMap<PathBuf, Vec<String>>> {
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("Directory not found: {}", dir.display())));
        }

        let matcher = pattern
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| Error::InvalidArgument(format!("Invalid file pattern: {e}")))?;

        let mut results = BTreeMap::new();
        let walker = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(matcher) = &matcher {
                let name = entry.file_name().to_string_lossy();
                if !matcher.matches(&name) {
                    continue;
                }
            }

            match self
                .ingest_file(entry.path(), metadata.clone(), None, None)
                .await
            {
                Ok(chunk_ids) => {
                    results.insert(entry.path().to_path_buf(), chunk_ids);
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "failed to ingest file");
                }
            }
        }

        let total_chunks: usize = results.values().map(Vec::len).sum();
        info!(files = results.len(), total_chunks, "directory ingestion complete");
        Ok(results)
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Decode a file using a fallback chain of common text encodings:
/// strict UTF-8, then windows-1252, then lossy UTF-8.
fn read_text_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| Error::storage_at(&path.to_path_buf(), e))?;

    if let Ok(text) = String::from_utf8(bytes.clone()) {
        return Ok(text);
    }

    let (text, _, had_errors) = encoding_rs::WINDOWS_1252.decode(&bytes);
    if !had_errors {
        debug!(path = %path.display(), "decoded as windows-1252");
        return Ok(text.into_owned());
    }

    debug!(path = %path.display(), "falling back to lossy utf-8");
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Infer a document type from the file extension (code vs. doc).
#[must_use]
pub fn infer_type(path: &Path) -> DocType {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    if CODE_EXTENSIONS.contains(&extension.as_str()) {
        DocType::Code
    } else {
        DocType::Doc
    }
}
