//! Configuration snapshot for the memory engine.
//!
//! Loaded once at startup and treated as immutable afterwards; runtime
//! overrides (per-call arguments) layer above the snapshot via explicit
//! parameters rather than mutating global state. Environment variables
//! mirror the flat key names, uppercased and prefixed `ENGRAM_`.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Which semantic store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// File-backed JSON + full-scan cosine
    Legacy,
    /// Persistent HNSW cosine index
    #[serde(rename = "chromadb")]
    ChromaDb,
}

impl FromStr for VectorBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "legacy" => Ok(VectorBackend::Legacy),
            "chromadb" => Ok(VectorBackend::ChromaDb),
            other => Err(Error::InvalidArgument(format!(
                "Unknown vector backend: {other}"
            ))),
        }
    }
}

/// Automatic learning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoLearningConfig {
    pub enabled: bool,
    /// `moderate` | `aggressive` | `minimal`
    pub mode: LearningMode,
    pub track_tasks: bool,
    pub track_code_changes: bool,
    pub track_operations: bool,
    pub min_episode_confidence: f64,
    pub episode_deduplication: bool,
}

impl Default for AutoLearningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: LearningMode::Moderate,
            track_tasks: true,
            track_code_changes: true,
            track_operations: true,
            min_episode_confidence: 0.6,
            episode_deduplication: true,
        }
    }
}

/// Detector arming mode for automatic learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningMode {
    Moderate,
    Aggressive,
    Minimal,
}

impl FromStr for LearningMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "moderate" => Ok(LearningMode::Moderate),
            "aggressive" => Ok(LearningMode::Aggressive),
            "minimal" => Ok(LearningMode::Minimal),
            other => Err(Error::InvalidArgument(format!(
                "Unknown learning mode: {other}"
            ))),
        }
    }
}

/// Conversation analyzer settings (universal hooks).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// `heuristic` | `llm` | `hybrid`
    pub extraction_mode: String,
    pub min_fact_confidence: f64,
    pub min_episode_confidence: f64,
    /// `per_session` | `per_day` | `global`
    pub deduplication_mode: DedupMode,
    pub deduplication_window_days: i64,
    /// Token budget for LLM extraction; zero disables the budget check
    pub max_tokens_per_message: usize,
    pub max_tokens_per_session: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            extraction_mode: "heuristic".to_string(),
            min_fact_confidence: 0.7,
            min_episode_confidence: 0.6,
            deduplication_mode: DedupMode::PerDay,
            deduplication_window_days: 7,
            max_tokens_per_message: 2_000,
            max_tokens_per_session: 20_000,
        }
    }
}

/// Deduplication strategy for extracted learnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupMode {
    PerSession,
    PerDay,
    Global,
}

impl FromStr for DedupMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "per_session" => Ok(DedupMode::PerSession),
            "per_day" => Ok(DedupMode::PerDay),
            "global" => Ok(DedupMode::Global),
            other => Err(Error::InvalidArgument(format!(
                "Unknown deduplication mode: {other}"
            ))),
        }
    }
}

/// Remote upload sandbox settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    pub max_age_seconds: u64,
    pub max_size_mb: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("/tmp/rag-uploads"),
            max_age_seconds: 3600,
            max_size_mb: 50,
        }
    }
}

/// Immutable configuration snapshot consumed by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub vector_backend: VectorBackend,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub min_retrieval_score: f32,
    pub query_expansion_enabled: bool,
    pub num_expansions: usize,
    pub context_injection_enabled: bool,
    pub max_context_chars: usize,
    pub upload: UploadConfig,
    pub automatic_learning: AutoLearningConfig,
    pub conversation_analyzer: AnalyzerConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            vector_backend: VectorBackend::ChromaDb,
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 5,
            min_retrieval_score: 0.0,
            query_expansion_enabled: false,
            num_expansions: 3,
            context_injection_enabled: false,
            max_context_chars: 5_000,
            upload: UploadConfig::default(),
            automatic_learning: AutoLearningConfig::default(),
            conversation_analyzer: AnalyzerConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// Layer environment overrides (highest priority) over this snapshot.
    ///
    /// Variable names mirror the flat config keys, uppercased and prefixed
    /// `ENGRAM_` (dots become underscores), e.g.
    /// `ENGRAM_VECTOR_BACKEND=legacy`,
    /// `ENGRAM_AUTOMATIC_LEARNING_ENABLED=true`.
    #[must_use]
    pub fn apply_env(mut self) -> Self {
        if let Some(v) = env_parse::<VectorBackend>("ENGRAM_VECTOR_BACKEND") {
            self.vector_backend = v;
        }
        if let Some(v) = env_parse("ENGRAM_CHUNK_SIZE") {
            self.chunk_size = v;
        }
        if let Some(v) = env_parse("ENGRAM_CHUNK_OVERLAP") {
            self.chunk_overlap = v;
        }
        if let Some(v) = env_parse("ENGRAM_TOP_K") {
            self.top_k = v;
        }
        if let Some(v) = env_parse("ENGRAM_MIN_RETRIEVAL_SCORE") {
            self.min_retrieval_score = v;
        }
        if let Some(v) = env_parse("ENGRAM_QUERY_EXPANSION_ENABLED") {
            self.query_expansion_enabled = v;
        }
        if let Some(v) = env_parse("ENGRAM_NUM_EXPANSIONS") {
            self.num_expansions = v;
        }
        if let Some(v) = env_parse("ENGRAM_CONTEXT_INJECTION_ENABLED") {
            self.context_injection_enabled = v;
        }
        if let Some(v) = env_parse("ENGRAM_MAX_CONTEXT_CHARS") {
            self.max_context_chars = v;
        }
        if let Some(v) = env_parse("ENGRAM_REMOTE_FILE_UPLOAD_ENABLED") {
            self.upload.enabled = v;
        }
        if let Ok(v) = env::var("ENGRAM_REMOTE_UPLOAD_DIRECTORY") {
            self.upload.directory = PathBuf::from(v);
        }
        if let Some(v) = env_parse("ENGRAM_REMOTE_UPLOAD_MAX_AGE_SECONDS") {
            self.upload.max_age_seconds = v;
        }
        if let Some(v) = env_parse("ENGRAM_REMOTE_UPLOAD_MAX_FILE_SIZE_MB") {
            self.upload.max_size_mb = v;
        }
        if let Some(v) = env_parse("ENGRAM_AUTOMATIC_LEARNING_ENABLED") {
            self.automatic_learning.enabled = v;
        }
        if let Some(v) = env_parse::<LearningMode>("ENGRAM_AUTOMATIC_LEARNING_MODE") {
            self.automatic_learning.mode = v;
        }
        if let Some(v) = env_parse("ENGRAM_AUTOMATIC_LEARNING_MIN_EPISODE_CONFIDENCE") {
            self.automatic_learning.min_episode_confidence = v;
        }
        if let Ok(v) = env::var("ENGRAM_UNIVERSAL_HOOKS_CONVERSATION_ANALYZER_EXTRACTION_MODE") {
            self.conversation_analyzer.extraction_mode = v;
        }
        if let Some(v) =
            env_parse::<DedupMode>("ENGRAM_UNIVERSAL_HOOKS_CONVERSATION_ANALYZER_DEDUPLICATION_MODE")
        {
            self.conversation_analyzer.deduplication_mode = v;
        }
        self
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = MemoryConfig::default();
        assert_eq!(cfg.vector_backend, VectorBackend::ChromaDb);
        assert_eq!(cfg.chunk_size, 500);
        assert_eq!(cfg.chunk_overlap, 50);
        assert_eq!(cfg.top_k, 5);
        assert!(!cfg.query_expansion_enabled);
        assert_eq!(cfg.max_context_chars, 5_000);
        assert!(cfg.upload.enabled);
        assert_eq!(cfg.upload.max_size_mb, 50);
        assert!(!cfg.automatic_learning.enabled);
        assert_eq!(cfg.conversation_analyzer.deduplication_window_days, 7);
    }

    #[test]
    fn backend_spellings() {
        assert_eq!(
            "chromadb".parse::<VectorBackend>().unwrap(),
            VectorBackend::ChromaDb
        );
        assert_eq!(
            "legacy".parse::<VectorBackend>().unwrap(),
            VectorBackend::Legacy
        );
        assert!("faiss".parse::<VectorBackend>().is_err());
    }
}
