//! Conversation analysis: extract candidate facts and episodes from
//! dialogue.
//!
//! Heuristic extraction (bounded latency, always available) runs a fixed
//! regex table; LLM extraction is optional, goes through the
//! [`ChatCompleter`] capability, and is governed by a token budget. Output
//! is the scored, deduplicated union of both.

pub mod llm;

pub use llm::ChatCompleter;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{AnalyzerConfig, DedupMode};
use crate::error::Result;

/// Base confidence for heuristic fact matches.
const FACT_BASE_CONFIDENCE: f64 = 0.85;
/// Base confidence for heuristic episode matches.
const EPISODE_BASE_CONFIDENCE: f64 = 0.75;

/// A candidate fact extracted from conversation.
#[derive(Debug, Clone, Serialize)]
pub struct FactLearning {
    pub key: String,
    pub value: Value,
    pub confidence: f64,
    /// `heuristic` or `llm`
    pub source: String,
}

/// A candidate episode extracted from conversation.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeLearning {
    pub lesson_type: String,
    pub situation: String,
    pub action: String,
    pub outcome: String,
    pub lesson: String,
    pub confidence: f64,
    pub source: String,
}

/// One extracted learning.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Learning {
    Fact(FactLearning),
    Episode(EpisodeLearning),
}

impl Learning {
    /// Deduplication key: `fact:<key>` or `episode:<lesson_type>`.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        match self {
            Learning::Fact(f) => format!("fact:{}", f.key),
            Learning::Episode(e) => format!("episode:{}", e.lesson_type),
        }
    }

    #[must_use]
    pub fn confidence(&self) -> f64 {
        match self {
            Learning::Fact(f) => f.confidence,
            Learning::Episode(e) => e.confidence,
        }
    }

    fn set_confidence(&mut self, confidence: f64) {
        match self {
            Learning::Fact(f) => f.confidence = confidence,
            Learning::Episode(e) => e.confidence = confidence,
        }
    }

    fn source(&self) -> &str {
        match self {
            Learning::Fact(f) => &f.source,
            Learning::Episode(e) => &e.source,
        }
    }
}

/// Heuristic (+ optional LLM) extractor over conversation turns.
pub struct ConversationAnalyzer {
    config: AnalyzerConfig,
    completer: Option<Arc<dyn ChatCompleter>>,
    fact_patterns: Vec<(&'static str, Regex)>,
    episode_patterns: Vec<(&'static str, Regex)>,
    /// dedup key → acceptance timestamps within the window
    seen: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
    session_tokens: Mutex<usize>,
}

impl ConversationAnalyzer {
    #[must_use]
    pub fn new(config: AnalyzerConfig, completer: Option<Arc<dyn ChatCompleter>>) -> Self {
        info!(
            mode = %config.extraction_mode,
            dedup = ?config.deduplication_mode,
            "conversation analyzer initialized"
        );
        Self {
            config,
            completer,
            fact_patterns: compile_fact_patterns(),
            episode_patterns: compile_episode_patterns(),
            seen: Mutex::new(HashMap::new()),
            session_tokens: Mutex::new(0),
        }
    }

    /// Analyze one `(user_message, agent_response)` exchange.
    pub async fn analyze(
        &self,
        user_message: &str,
        agent_response: &str,
        extraction_mode: Option<&str>,
    ) -> Result<Vec<Learning>> {
        let mode = extraction_mode.unwrap_or(&self.config.extraction_mode);
        let mut learnings = Vec::new();

        for text in [user_message, agent_response] {
            if text.is_empty() {
                continue;
            }
            learnings.extend(self.extract_facts_heuristic(text));
            learnings.extend(self.extract_episodes_heuristic(text));
        }

        if matches!(mode, "llm" | "hybrid") {
            let combined = format!("{user_message} {agent_response}");
            learnings.extend(self.extract_facts_llm(&combined).await);
        }

        for learning in &mut learnings {
            let scored = score_confidence(learning);
            learning.set_confidence(scored);
        }

        let learnings = self.deduplicate(learnings, Utc::now());
        debug!(count = learnings.len(), "conversation analyzed");
        Ok(learnings)
    }

    fn extract_facts_heuristic(&self, text: &str) -> Vec<Learning> {
        let mut facts = Vec::new();
        for (key, pattern) in &self.fact_patterns {
            if let Some(captures) = pattern.captures(text) {
                // Preferences keep the preferred thing; everything else
                // keeps the full matched statement.
                let value = if *key == "preference" {
                    captures.get(1).map(|m| m.as_str())
                } else {
                    captures.get(0).map(|m| m.as_str())
                };
                let Some(value) = value else { continue };
                facts.push(Learning::Fact(FactLearning {
                    key: (*key).to_string(),
                    value: Value::from(value),
                    confidence: FACT_BASE_CONFIDENCE,
                    source: "heuristic".to_string(),
                }));
            }
        }
        facts
    }

    fn extract_episodes_heuristic(&self, text: &str) -> Vec<Learning> {
        let mut episodes = Vec::new();
        for (lesson_type, pattern) in &self.episode_patterns {
            if let Some(matched) = pattern.find(text) {
                let situation: String = text.chars().take(100).collect();
                episodes.push(Learning::Episode(EpisodeLearning {
                    lesson_type: (*lesson_type).to_string(),
                    situation,
                    action: format!("Pattern detected: {}", matched.as_str()),
                    outcome: if *lesson_type == "success" {
                        "success".to_string()
                    } else {
                        "pattern".to_string()
                    },
                    lesson: abstract_lesson(lesson_type).to_string(),
                    confidence: EPISODE_BASE_CONFIDENCE,
                    source: "heuristic".to_string(),
                }));
            }
        }
        episodes
    }

    /// At most one LLM extraction call per exchange, budget permitting.
    async fn extract_facts_llm(&self, text: &str) -> Vec<Learning> {
        let Some(completer) = &self.completer else {
            debug!("no chat completer configured, skipping LLM extraction");
            return Vec::new();
        };

        let estimated = llm::estimate_tokens(text);
        if self.config.max_tokens_per_message > 0 && estimated > self.config.max_tokens_per_message
        {
            info!(estimated, "skipping LLM extraction: message exceeds token budget");
            return Vec::new();
        }
        {
            let used = self.session_tokens.lock();
            if self.config.max_tokens_per_session > 0
                && *used + estimated > self.config.max_tokens_per_session
            {
                info!(used = *used, estimated, "skipping LLM extraction: session budget exceeded");
                return Vec::new();
            }
        }

        let response = match completer
            .complete(llm::JSON_SYSTEM_PROMPT, &llm::fact_extraction_prompt(text), 0.3, 500)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "LLM fact extraction failed");
                return Vec::new();
            }
        };
        *self.session_tokens.lock() += estimated;

        match llm::parse_fact_response(&response) {
            Ok(facts) => facts
                .into_iter()
                .map(|(key, value, confidence)| {
                    Learning::Fact(FactLearning {
                        key,
                        value,
                        confidence,
                        source: "llm".to_string(),
                    })
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "failed to parse LLM fact response");
                Vec::new()
            }
        }
    }

    /// Apply the configured deduplication strategy at instant `now`.
    ///
    /// `per_day` accepts each key at most once per calendar day but keeps
    /// every occurrence timestamp inside the window, so repetition across
    /// days still reinforces frequency. `per_session` and `global` accept
    /// a key exactly once for the analyzer's lifetime.
    #[must_use]
    pub fn deduplicate(&self, learnings: Vec<Learning>, now: DateTime<Utc>) -> Vec<Learning> {
        let cutoff = now - Duration::days(self.config.deduplication_window_days);
        let mut seen = self.seen.lock();
        let mut kept = Vec::new();

        for learning in learnings {
            let key = learning.dedup_key();
            match self.config.deduplication_mode {
                DedupMode::PerDay => {
                    let timestamps = seen.entry(key.clone()).or_default();
                    timestamps.retain(|t| *t > cutoff);

                    let today = (now.year(), now.ordinal());
                    let already_today =
                        timestamps.iter().any(|t| (t.year(), t.ordinal()) == today);
                    timestamps.push(now);

                    if already_today {
                        debug!(key, "skipping duplicate (per-day)");
                    } else {
                        kept.push(learning);
                    }
                }
                DedupMode::PerSession | DedupMode::Global => {
                    if seen.contains_key(&key) {
                        debug!(key, "skipping duplicate");
                    } else {
                        seen.insert(key, vec![now]);
                        kept.push(learning);
                    }
                }
            }
        }
        kept
    }
}

/// Final confidence scoring; heuristic matches get a small boost.
fn score_confidence(learning: &Learning) -> f64 {
    let base = learning.confidence();
    if learning.source() == "heuristic" {
        (base * 1.1).min(1.0)
    } else {
        base.min(1.0)
    }
}

/// Fixed abstraction per detected lesson type, so the lesson is never a
/// verbatim restatement of the situation.
fn abstract_lesson(lesson_type: &str) -> &'static str {
    match lesson_type {
        "workaround" => "Workarounds can solve seemingly impossible problems",
        "mistake" => "Documenting mistakes prevents repetition",
        "lesson" => "Explicitly stated lessons capture tacit knowledge",
        "recommendation" => "User recommendations often shortcut experimentation",
        "success" => "Successful patterns should be repeated",
        _ => "Pattern detected from conversation",
    }
}

fn compile_fact_patterns() -> Vec<(&'static str, Regex)> {
    [
        ("api_endpoint", r"(?i)API (?:endpoint|url|address) is (https?://\S+)"),
        ("version", r"(?i)\b(?:version|ver) is ([\d.]+)"),
        ("preference", r"(?i)prefer (\w+) over (\w+)"),
        ("decision", r"(?i)(?:decided|agreed|confirmed) to use (\w+)"),
        ("constraint", r"(?i)(?:must|cannot|should not) (?:use|support) (\w+)"),
    ]
    .into_iter()
    .filter_map(|(key, pattern)| Regex::new(pattern).ok().map(|re| (key, re)))
    .collect()
}

fn compile_episode_patterns() -> Vec<(&'static str, Regex)> {
    [
        ("workaround", r"(?i)(?:i found|there(?:'|’)?s a) .*?workaround"),
        ("mistake", r"(?i)(?:this|that) .*?(?:didn't work|was a mistake|failed)"),
        ("lesson", r"(?i)(?:the |i )(?:lesson is|learned)"),
        ("recommendation", r"(?i)(?:i recommend|you should)"),
        ("success", r"(?i)successfully (?:completed|finished)"),
    ]
    .into_iter()
    .filter_map(|(key, pattern)| Regex::new(pattern).ok().map(|re| (key, re)))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn analyzer() -> ConversationAnalyzer {
        ConversationAnalyzer::new(AnalyzerConfig::default(), None)
    }

    #[tokio::test]
    async fn api_endpoint_facts_are_extracted() {
        let learnings = analyzer()
            .analyze("The API endpoint is https://api.example.com/v2", "", None)
            .await
            .unwrap();

        let fact = learnings
            .iter()
            .find_map(|l| match l {
                Learning::Fact(f) if f.key == "api_endpoint" => Some(f),
                _ => None,
            })
            .unwrap();
        assert!(fact.value.as_str().unwrap().contains("https://api.example.com/v2"));
        // 0.85 boosted by 1.1 for heuristic matches.
        assert!((fact.confidence - 0.935).abs() < 1e-9);
    }

    #[tokio::test]
    async fn preferences_keep_the_preferred_value() {
        let learnings = analyzer()
            .analyze("I prefer tabs over spaces", "", None)
            .await
            .unwrap();
        let fact = learnings
            .iter()
            .find_map(|l| match l {
                Learning::Fact(f) if f.key == "preference" => Some(f),
                _ => None,
            })
            .unwrap();
        assert_eq!(fact.value, Value::from("tabs"));
    }

    #[tokio::test]
    async fn workaround_episodes_carry_abstracted_lessons() {
        let learnings = analyzer()
            .analyze("", "I found a clever workaround for the race condition", None)
            .await
            .unwrap();
        let episode = learnings
            .iter()
            .find_map(|l| match l {
                Learning::Episode(e) => Some(e),
                _ => None,
            })
            .unwrap();
        assert_eq!(episode.lesson_type, "workaround");
        assert_ne!(episode.lesson, episode.situation);
    }

    #[test]
    fn per_day_dedup_filters_same_day_repeats() {
        let analyzer = analyzer();
        let learning = || {
            vec![Learning::Fact(FactLearning {
                key: "version".to_string(),
                value: Value::from("1.2.3"),
                confidence: 0.9,
                source: "heuristic".to_string(),
            })]
        };

        let day_one = Utc::now();
        assert_eq!(analyzer.deduplicate(learning(), day_one).len(), 1);
        // Same calendar day: filtered.
        assert_eq!(analyzer.deduplicate(learning(), day_one).len(), 0);
        // Next day: accepted again.
        let day_two = day_one + Duration::days(1);
        assert_eq!(analyzer.deduplicate(learning(), day_two).len(), 1);
    }

    #[test]
    fn global_dedup_never_repeats() {
        let config = AnalyzerConfig {
            deduplication_mode: DedupMode::Global,
            ..AnalyzerConfig::default()
        };
        let analyzer = ConversationAnalyzer::new(config, None);
        let learning = || {
            vec![Learning::Episode(EpisodeLearning {
                lesson_type: "mistake".to_string(),
                situation: "s".to_string(),
                action: "a".to_string(),
                outcome: "pattern".to_string(),
                lesson: "l".to_string(),
                confidence: 0.8,
                source: "heuristic".to_string(),
            })]
        };

        let now = Utc::now();
        assert_eq!(analyzer.deduplicate(learning(), now).len(), 1);
        assert_eq!(
            analyzer.deduplicate(learning(), now + Duration::days(10)).len(),
            0
        );
    }

    struct CannedCompleter(String);

    #[async_trait]
    impl ChatCompleter for CannedCompleter {
        async fn complete(&self, _: &str, _: &str, _: f32, _: usize) -> crate::error::Result<String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn llm_mode_merges_structured_facts() {
        let completer: Arc<dyn ChatCompleter> = Arc::new(CannedCompleter(
            r#"{"facts": [{"key": "db_host", "value": "db.internal", "confidence": 0.9}]}"#
                .to_string(),
        ));
        let config = AnalyzerConfig {
            extraction_mode: "llm".to_string(),
            ..AnalyzerConfig::default()
        };
        let analyzer = ConversationAnalyzer::new(config, Some(completer));

        let learnings = analyzer
            .analyze("The database lives at db.internal", "", None)
            .await
            .unwrap();
        assert!(learnings.iter().any(|l| matches!(
            l,
            Learning::Fact(f) if f.key == "db_host" && f.source == "llm"
        )));
    }

    #[tokio::test]
    async fn token_budget_blocks_oversized_messages() {
        let completer: Arc<dyn ChatCompleter> =
            Arc::new(CannedCompleter(r#"{"facts": [{"key": "x", "value": 1}]}"#.to_string()));
        let config = AnalyzerConfig {
            extraction_mode: "llm".to_string(),
            max_tokens_per_message: 2,
            ..AnalyzerConfig::default()
        };
        let analyzer = ConversationAnalyzer::new(config, Some(completer));

        let learnings = analyzer
            .analyze("this message is far longer than eight characters", "", None)
            .await
            .unwrap();
        assert!(!learnings.iter().any(|l| l.source() == "llm"));
    }
}
