//! Conversion of detected candidates into storable episodes.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use super::tracker::LearningCandidate;
use crate::analyzer::ChatCompleter;
use crate::analyzer::llm::{JSON_SYSTEM_PROMPT, strip_code_fences};

/// Candidates below this confidence are never extracted.
const MIN_EXTRACTION_CONFIDENCE: f64 = 0.6;

/// Fixed prompt for LLM episode extraction.
const EPISODE_EXTRACTION_PROMPT: &str = r#"You are a learning extraction system for an AI agent.

Analyze this completed task and extract a learnable episode:

Task Information:
- Situation: {situation}
- Action: {action}
- Outcome: {outcome}

STRICT RULES:
1. Extract an episode ONLY if the task succeeded in a non-obvious way, a
   mistake was made and corrected, or the strategy applies to future tasks.
2. The lesson MUST be abstract (not specific to this exact situation),
   actionable, and under 200 characters.

OUTPUT FORMAT (JSON only):
{"situation": "...", "action": "...", "outcome": "success/failure", "lesson": "...", "confidence": 0.75}

If NO lesson qualifies, return: {"should_extract": false}"#;

/// An episode produced by extraction, ready for the episodic store.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedEpisode {
    pub situation: String,
    pub action: String,
    pub outcome: String,
    pub lesson: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.7
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    should_extract: Option<bool>,
    #[serde(flatten)]
    episode: Option<ExtractedEpisode>,
}

/// Turns candidates into episodes, via LLM when available with a
/// deterministic rule-based fallback.
pub struct LearningExtractor {
    completer: Option<Arc<dyn ChatCompleter>>,
}

impl LearningExtractor {
    #[must_use]
    pub fn new(completer: Option<Arc<dyn ChatCompleter>>) -> Self {
        Self { completer }
    }

    /// Extract a storable episode from a candidate.
    ///
    /// Returns `None` when the candidate's confidence is below 0.60, when
    /// the produced lesson fails the abstraction test, or when the LLM
    /// declines and the fallback produces nothing better.
    pub async fn extract(&self, candidate: &LearningCandidate) -> Option<ExtractedEpisode> {
        if candidate.confidence < MIN_EXTRACTION_CONFIDENCE {
            debug!(
                confidence = candidate.confidence,
                "candidate confidence too low for extraction"
            );
            return None;
        }

        if let Some(completer) = &self.completer {
            if let Some(episode) = self.extract_with_llm(completer, candidate).await {
                return validate(episode);
            }
        }

        validate(rule_based(candidate))
    }

    async fn extract_with_llm(
        &self,
        completer: &Arc<dyn ChatCompleter>,
        candidate: &LearningCandidate,
    ) -> Option<ExtractedEpisode> {
        let prompt = EPISODE_EXTRACTION_PROMPT
            .replace("{situation}", &candidate.situation)
            .replace("{action}", &candidate.action)
            .replace("{outcome}", &candidate.outcome);

        let response = match completer.complete(JSON_SYSTEM_PROMPT, &prompt, 0.3, 500).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "LLM episode extraction failed, using rule-based fallback");
                return None;
            }
        };

        let cleaned = strip_code_fences(&response);
        match serde_json::from_str::<ExtractionResponse>(cleaned) {
            Ok(parsed) => {
                if parsed.should_extract == Some(false) {
                    debug!("LLM declined to extract an episode");
                    return None;
                }
                parsed.episode
            }
            Err(e) => {
                warn!(error = %e, "unparseable LLM episode response");
                None
            }
        }
    }
}

/// Deterministic fallback: synthesize the lesson from the strategy.
fn rule_based(candidate: &LearningCandidate) -> ExtractedEpisode {
    ExtractedEpisode {
        situation: candidate.situation.clone(),
        action: candidate.action.clone(),
        outcome: candidate.outcome.clone(),
        lesson: format!("Strategy: {} leads to {}", candidate.action, candidate.outcome),
        confidence: candidate.confidence,
    }
}

/// Final checks shared by both extraction paths.
fn validate(episode: ExtractedEpisode) -> Option<ExtractedEpisode> {
    if episode.confidence < MIN_EXTRACTION_CONFIDENCE {
        return None;
    }
    if episode.lesson.trim().is_empty() || episode.lesson.trim() == episode.situation.trim() {
        debug!("rejecting episode: lesson is not an abstraction");
        return None;
    }
    Some(episode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::tracker::CandidateKind;
    use async_trait::async_trait;

    fn candidate(confidence: f64) -> LearningCandidate {
        LearningCandidate {
            kind: CandidateKind::TaskCompletion,
            situation: "Multiple files needed to be ingested".to_string(),
            action: "File ingestion completed successfully for multiple files".to_string(),
            outcome: "success".to_string(),
            confidence,
        }
    }

    #[tokio::test]
    async fn rule_based_fallback_synthesizes_strategy_lesson() {
        let extractor = LearningExtractor::new(None);
        let episode = extractor.extract(&candidate(0.8)).await.unwrap();
        assert_eq!(
            episode.lesson,
            "Strategy: File ingestion completed successfully for multiple files leads to success"
        );
        assert_eq!(episode.confidence, 0.8);
    }

    #[tokio::test]
    async fn low_confidence_candidates_are_rejected() {
        let extractor = LearningExtractor::new(None);
        assert!(extractor.extract(&candidate(0.5)).await.is_none());
    }

    struct CannedCompleter(&'static str);

    #[async_trait]
    impl ChatCompleter for CannedCompleter {
        async fn complete(&self, _: &str, _: &str, _: f32, _: usize) -> crate::error::Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn llm_episode_is_used_when_parseable() {
        let completer: Arc<dyn ChatCompleter> = Arc::new(CannedCompleter(
            r#"```json
{"situation": "bulk ingest", "action": "batched the files", "outcome": "success",
 "lesson": "Batching file operations amortizes overhead", "confidence": 0.82}
```"#,
        ));
        let extractor = LearningExtractor::new(Some(completer));
        let episode = extractor.extract(&candidate(0.8)).await.unwrap();
        assert_eq!(episode.lesson, "Batching file operations amortizes overhead");
        assert_eq!(episode.confidence, 0.82);
    }

    #[tokio::test]
    async fn llm_decline_falls_back_to_rule() {
        let completer: Arc<dyn ChatCompleter> =
            Arc::new(CannedCompleter(r#"{"should_extract": false}"#));
        let extractor = LearningExtractor::new(Some(completer));
        let episode = extractor.extract(&candidate(0.8)).await.unwrap();
        assert!(episode.lesson.starts_with("Strategy:"));
    }

    #[tokio::test]
    async fn unparseable_llm_output_falls_back_to_rule() {
        let completer: Arc<dyn ChatCompleter> = Arc::new(CannedCompleter("not json at all"));
        let extractor = LearningExtractor::new(Some(completer));
        let episode = extractor.extract(&candidate(0.8)).await.unwrap();
        assert!(episode.lesson.starts_with("Strategy:"));
    }

    #[tokio::test]
    async fn restated_lessons_fail_the_abstraction_test() {
        let completer: Arc<dyn ChatCompleter> = Arc::new(CannedCompleter(
            r#"{"situation": "X", "action": "a", "outcome": "success", "lesson": "X", "confidence": 0.9}"#,
        ));
        let extractor = LearningExtractor::new(Some(completer));
        assert!(extractor.extract(&candidate(0.8)).await.is_none());
    }
}
