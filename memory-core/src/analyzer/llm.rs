//! Optional LLM extraction for the conversation analyzer.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Capability for chat-completion calls used by extraction.
///
/// The core never talks to a model vendor directly; hosts plug in an
/// implementation (or none, in which case heuristics run alone).
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    /// Issue one completion and return the raw text response.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String>;
}

/// System prompt for structured JSON extraction.
pub const JSON_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that outputs valid JSON only.";

/// Build the fact-extraction prompt for a message.
#[must_use]
pub fn fact_extraction_prompt(message: &str) -> String {
    format!(
        "Analyze this message and extract factual statements:\n\n\
         Message: {message}\n\n\
         Extract facts about:\n\
         - Project configuration (API endpoints, versions, paths, settings)\n\
         - User preferences (\"prefer X over Y\")\n\
         - Technical decisions (framework choice, architecture)\n\
         - Constraints/requirements (\"must use X\", \"cannot use Y\")\n\n\
         Return JSON: {{\"facts\": [{{\"key\": \"fact_key\", \"value\": \"fact_value\", \
         \"confidence\": 0.9}}]}}\n\n\
         If NO facts qualify, return: {{\"facts\": []}}"
    )
}

/// Strip markdown code fences from an LLM response before JSON parsing.
#[must_use]
pub fn strip_code_fences(response: &str) -> &str {
    let mut cleaned = response.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Parse the `{"facts": [...]}` response shape.
pub fn parse_fact_response(response: &str) -> Result<Vec<(String, serde_json::Value, f64)>> {
    let cleaned = strip_code_fences(response);
    let value: serde_json::Value = serde_json::from_str(cleaned)
        .map_err(|e| Error::DependencyUnavailable(format!("Unparseable LLM response: {e}")))?;

    let Some(facts) = value.get("facts").and_then(|f| f.as_array()) else {
        return Ok(Vec::new());
    };

    Ok(facts
        .iter()
        .filter_map(|fact| {
            let key = fact.get("key")?.as_str()?.to_string();
            if key.is_empty() {
                return None;
            }
            let value = fact.get("value").cloned().unwrap_or(serde_json::Value::Null);
            let confidence = fact
                .get("confidence")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.8)
                .clamp(0.0, 1.0);
            Some((key, value, confidence))
        })
        .collect())
}

/// Rough token estimate: 4 characters ≈ 1 token.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("{}"), "{}");
    }

    #[test]
    fn fact_responses_parse() {
        let response = r#"{"facts": [{"key": "api_url", "value": "http://x", "confidence": 0.95}]}"#;
        let facts = parse_fact_response(response).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].0, "api_url");
        assert_eq!(facts[0].2, 0.95);
    }

    #[test]
    fn empty_and_malformed_responses() {
        assert!(parse_fact_response(r#"{"facts": []}"#).unwrap().is_empty());
        assert!(parse_fact_response("not json").is_err());
        // Out-of-range confidence is clamped, missing keys skipped.
        let facts = parse_fact_response(
            r#"{"facts": [{"key": "k", "confidence": 7.0}, {"value": "orphan"}]}"#,
        )
        .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].2, 1.0);
    }

    #[test]
    fn token_estimate_is_quarter_chars() {
        assert_eq!(estimate_tokens("12345678"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }
}
