#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]

//! # Engram Core
//!
//! Multi-tenant memory engine for autonomous coding agents. Every project
//! owns three kinds of memory, merged under a fixed authority hierarchy:
//!
//! - **Symbolic** — explicit, authoritative facts keyed by `(scope, key)`
//! - **Episodic** — advisory situation/action/outcome/lesson records
//! - **Semantic** — non-authoritative document chunks retrieved by vector
//!   similarity with citations
//!
//! ## Module Organization
//!
//! - [`backend`]: the tool façade binding a project to its stores
//! - [`symbolic`], [`episodic`], [`semantic`]: the three store families
//! - [`project`]: project lifecycle, registry, and on-disk layout
//! - [`ingest`], [`retrieval`], [`inject`]: the semantic pipeline
//! - [`analyzer`], [`learning`]: conversation analysis and auto-learning
//! - [`embeddings`]: the embedder capability with deterministic fallback
//! - [`monitoring`], [`security`]: metrics and the upload sandbox guard
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use engram_core::backend::{AddFactParams, MemoryBackend};
//! use engram_core::config::MemoryConfig;
//! use engram_core::embeddings::HashEmbedder;
//!
//! #[tokio::main]
//! async fn main() -> engram_core::Result<()> {
//!     let backend = MemoryBackend::new(
//!         MemoryConfig::default().apply_env(),
//!         Path::new("./data"),
//!         Arc::new(HashEmbedder::default()),
//!         None,
//!     )
//!     .await?;
//!
//!     let response = backend
//!         .add_fact(&AddFactParams {
//!             project_id: "demo".to_string(),
//!             fact_key: "output_format".to_string(),
//!             fact_value: serde_json::json!("json"),
//!             confidence: 0.9,
//!             category: None,
//!             auto_learn: None,
//!         })
//!         .await?;
//!     println!("{response}");
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod backend;
pub mod config;
pub mod embeddings;
pub mod episodic;
pub mod error;
pub mod ingest;
pub mod inject;
pub mod learning;
pub mod monitoring;
pub mod project;
pub mod retrieval;
pub mod security;
pub mod semantic;
pub mod symbolic;
pub mod types;

// Re-export commonly used types
pub use analyzer::{ChatCompleter, ConversationAnalyzer, Learning};
pub use backend::MemoryBackend;
pub use config::{MemoryConfig, VectorBackend};
pub use embeddings::{CachedEmbedder, Embedder, HashEmbedder, cosine_similarity};
pub use episodic::{EpisodeQuery, EpisodicStore};
pub use error::{Error, Result};
pub use ingest::Ingestor;
pub use inject::{PromptBuilder, PromptInputs};
pub use learning::{AutoLearningTracker, LearningExtractor};
pub use monitoring::MetricsRegistry;
pub use project::ProjectManager;
pub use retrieval::{RetrievalRequest, RetrievalTrigger, Retriever};
pub use security::RemoteUploadGuard;
pub use semantic::{SemanticStore, semantic_store_at};
pub use symbolic::{FactQuery, SymbolicStore};
pub use types::{
    Authority, DocumentChunk, Episode, FactCategory, FactSource, MemoryFact, OperationRecord,
    Project, ProjectStatus,
};
