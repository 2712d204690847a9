//! Automatic learning: operation tracking, detection, and extraction.

mod extractor;
mod tracker;

pub use extractor::{ExtractedEpisode, LearningExtractor};
pub use tracker::{AutoLearningTracker, BufferStats, CandidateKind, LearningCandidate};

use std::collections::HashSet;

/// Token-Jaccard similarity between two lessons, used to drop
/// near-duplicate episodes (threshold 0.85).
#[must_use]
pub fn lesson_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let tokens_a: HashSet<String> = a.to_lowercase().split_whitespace().map(str::to_string).collect();
    let tokens_b: HashSet<String> = b.to_lowercase().split_whitespace().map(str::to_string).collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    intersection as f64 / union as f64
}

/// Similarity threshold above which two lessons count as duplicates.
pub const DEDUP_SIMILARITY_THRESHOLD: f64 = 0.85;
