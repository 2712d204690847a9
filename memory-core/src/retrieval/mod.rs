//! Trigger-gated, ranked retrieval against the semantic store.
//!
//! Retrieval is query-driven, never automatic: callers must name one of the
//! closed set of triggers, and anything else fails with `InvalidTrigger`.

mod expansion;

pub use expansion::QueryExpander;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::embeddings::Embedder;
use crate::error::{Error, Result};
use crate::semantic::SemanticStore;
use crate::types::ChunkHit;

/// Days over which the recency boost decays linearly to zero.
pub const RECENCY_DECAY_DAYS: f64 = 30.0;

/// Query keywords suggesting the caller wants code.
const CODE_KEYWORDS: [&str; 6] = ["function", "class", "api", "method", "implement", "code"];

/// Reasons a caller may give to justify a semantic retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalTrigger {
    ExternalInfoNeeded,
    SymbolicMemoryInsufficient,
    EpisodicSuggestsRetrieval,
    ExplicitRetrievalRequest,
}

impl RetrievalTrigger {
    /// The default trigger used by internal call sites.
    pub const DEFAULT: RetrievalTrigger = RetrievalTrigger::ExternalInfoNeeded;

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RetrievalTrigger::ExternalInfoNeeded => "external_info_needed",
            RetrievalTrigger::SymbolicMemoryInsufficient => "symbolic_memory_insufficient",
            RetrievalTrigger::EpisodicSuggestsRetrieval => "episodic_suggests_retrieval",
            RetrievalTrigger::ExplicitRetrievalRequest => "explicit_retrieval_request",
        }
    }
}

impl FromStr for RetrievalTrigger {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "external_info_needed" => Ok(RetrievalTrigger::ExternalInfoNeeded),
            "symbolic_memory_insufficient" => Ok(RetrievalTrigger::SymbolicMemoryInsufficient),
            "episodic_suggests_retrieval" => Ok(RetrievalTrigger::EpisodicSuggestsRetrieval),
            "explicit_retrieval_request" => Ok(RetrievalTrigger::ExplicitRetrievalRequest),
            other => Err(Error::InvalidTrigger(format!(
                "{other:?} is not a valid retrieval trigger; retrieval must be \
                 explicitly triggered, not automatic"
            ))),
        }
    }
}

/// One ranked retrieval result with its scoring breakdown.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RankedHit {
    #[serde(flatten)]
    pub hit: ChunkHit,
    /// `0.7·similarity + 0.2·metadata + 0.1·recency`
    pub combined_score: f32,
    pub metadata_boost: f32,
    pub recency_boost: f32,
}

/// Parameters for one retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    pub trigger: RetrievalTrigger,
    pub top_k: usize,
    pub filters: Option<Map<String, Value>>,
    pub min_score: f32,
    pub include_recency: bool,
}

impl RetrievalRequest {
    #[must_use]
    pub fn new(query: impl Into<String>, trigger: RetrievalTrigger) -> Self {
        Self {
            query: query.into(),
            trigger,
            top_k: 5,
            filters: None,
            min_score: 0.0,
            include_recency: true,
        }
    }

    /// Request seeded with the configured `top_k` and retrieval floor.
    #[must_use]
    pub fn from_config(
        query: impl Into<String>,
        trigger: RetrievalTrigger,
        config: &crate::config::MemoryConfig,
    ) -> Self {
        let mut request = Self::new(query, trigger);
        request.top_k = config.top_k;
        request.min_score = config.min_retrieval_score;
        request
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

/// Ranked, trigger-gated search against one project's semantic store.
pub struct Retriever {
    store: Arc<dyn SemanticStore>,
    embedder: Arc<dyn Embedder>,
    expansion_enabled: bool,
    num_expansions: usize,
}

impl Retriever {
    #[must_use]
    pub fn new(
        store: Arc<dyn SemanticStore>,
        embedder: Arc<dyn Embedder>,
        expansion_enabled: bool,
        num_expansions: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            expansion_enabled,
            num_expansions,
        }
    }

    /// Retrieve relevant chunks for a query.
    ///
    /// Degrades to an empty result set when no query embedding can be
    /// produced; the trigger is validated regardless.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<RankedHit>> {
        if self.expansion_enabled {
            return self.retrieve_with_expansion(request).await;
        }

        let raw = self
            .search_raw(&request.query, request.top_k * 2, request.filters.as_ref(), request.min_score)
            .await?;
        let mut ranked = rank_results(raw, &request.query, request.include_recency);
        ranked.truncate(request.top_k);
        Ok(ranked)
    }

    /// Retrieval with deterministic query expansion: search once per
    /// paraphrase, deduplicate by chunk content keeping the best
    /// similarity, then rank the merged set.
    async fn retrieve_with_expansion(&self, request: &RetrievalRequest) -> Result<Vec<RankedHit>> {
        let expander = QueryExpander::new(self.num_expansions);
        let queries = expander.expand(&request.query);
        debug!(expansions = queries.len(), "retrieving with query expansion");

        let mut merged: HashMap<String, ChunkHit> = HashMap::new();
        for query in &queries {
            let hits = self
                .search_raw(query, request.top_k * 2, request.filters.as_ref(), request.min_score)
                .await?;
            for hit in hits {
                match merged.get_mut(&hit.content) {
                    Some(existing) if existing.score >= hit.score => {}
                    _ => {
                        merged.insert(hit.content.clone(), hit);
                    }
                }
            }
        }

        let mut ranked = rank_results(
            merged.into_values().collect(),
            &request.query,
            request.include_recency,
        );
        ranked.truncate(request.top_k);
        Ok(ranked)
    }

    async fn search_raw(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&Map<String, Value>>,
        min_score: f32,
    ) -> Result<Vec<ChunkHit>> {
        let embedding = match self.embedder.embed_single(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(error = %e, "query embedding unavailable, returning no results");
                return Ok(Vec::new());
            }
        };
        if embedding.is_empty() {
            return Ok(Vec::new());
        }
        self.store.search(&embedding, top_k, filters, min_score)
    }

    /// Human-readable ranking explanations for transparency.
    #[must_use]
    pub fn explain_ranking(results: &[RankedHit]) -> Vec<String> {
        results
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let preview: String = r.hit.content.chars().take(50).collect();
                let mut parts = vec![format!("similarity: {:.3}", r.hit.score)];
                if r.metadata_boost > 0.0 {
                    parts.push(format!("metadata: +{:.3}", r.metadata_boost));
                }
                if r.recency_boost > 0.0 {
                    parts.push(format!("recency: +{:.3}", r.recency_boost));
                }
                format!("{}. {}... [{}] [{}]", i + 1, preview, parts.join(", "), r.hit.citation)
            })
            .collect()
    }
}

/// Rank hits by `0.7·sim + 0.2·metadata_boost + 0.1·recency_boost`.
fn rank_results(hits: Vec<ChunkHit>, query: &str, include_recency: bool) -> Vec<RankedHit> {
    let mut ranked: Vec<RankedHit> = hits
        .into_iter()
        .map(|hit| {
            let metadata_boost = metadata_boost(query, &hit.metadata);
            let recency_boost = if include_recency {
                recency_boost(&hit)
            } else {
                0.0
            };
            let combined_score = hit.score * 0.7 + metadata_boost * 0.2 + recency_boost * 0.1;
            RankedHit {
                hit,
                combined_score,
                metadata_boost,
                recency_boost,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

/// Metadata relevance boost, clamped to [0, 1].
///
/// Code-keyword queries boost `type=code` chunks (+0.3) or filenames
/// containing "code" (+0.2); a source path occurring in the query adds +0.2.
fn metadata_boost(query: &str, metadata: &Map<String, Value>) -> f32 {
    let mut boost = 0.0f32;
    let query_lower = query.to_lowercase();

    let doc_type = metadata.get("type").and_then(Value::as_str).unwrap_or("doc");
    let filename = metadata
        .get("filename")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();

    if CODE_KEYWORDS.iter().any(|kw| query_lower.contains(kw)) {
        if doc_type == "code" {
            boost += 0.3;
        } else if filename.contains("code") {
            boost += 0.2;
        }
    }

    if let Some(source) = metadata.get("source").and_then(Value::as_str) {
        if !source.is_empty() && query_lower.contains(&source.to_lowercase()) {
            boost += 0.2;
        }
    }

    boost.min(1.0)
}

/// Linear recency decay from 1.0 (now) to 0.0 at [`RECENCY_DECAY_DAYS`].
fn recency_boost(hit: &ChunkHit) -> f32 {
    let age = Utc::now().signed_duration_since(hit.created_at);
    let days = age.num_seconds() as f64 / 86_400.0;
    if days < 0.0 {
        return 1.0;
    }
    if days >= RECENCY_DECAY_DAYS {
        return 0.0;
    }
    (1.0 - days / RECENCY_DECAY_DAYS) as f32
}
