//! Forbidden-content guard for semantic ingestion.
//!
//! Semantic memory stores documents and code only. Preferences and
//! decisions belong in symbolic memory, agent lessons in episodic memory,
//! and chat history nowhere. The guard rejects offending metadata keys and
//! phrase-level content matches before anything is persisted. Matching is
//! phrase-based, not token-based: "episode" alone is a legitimate technical
//! term and must not trip the guard.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Metadata keys that identify content belonging in another store.
const FORBIDDEN_METADATA_KEYS: [&str; 10] = [
    "user_preference",
    "preference",
    "user_likes",
    "agent_decision",
    "decision",
    "system_decision",
    "agent_lesson",
    "chat_history",
    "conversation",
    "dialogue",
];

/// Phrases identifying user preferences.
const USER_PREFERENCE_PHRASES: [&str; 7] = [
    "user prefers",
    "user likes",
    "user wants",
    "user preference",
    "the user prefers",
    "the user likes",
    "the user wants",
];

/// Phrases identifying recorded decisions.
const DECISION_PHRASES: [&str; 5] = [
    "decision was made",
    "we decided to",
    "the system decided",
    "agent decided to",
    "system decided to",
];

/// Phrases identifying agent lessons.
const LESSON_PHRASES: [&str; 5] = [
    "agent learned that",
    "the agent learned that",
    "our agent learned",
    "lesson was that",
    "the lesson was that",
];

/// Check a document against the forbidden-content policy.
///
/// Returns `ForbiddenContent` naming the offending key or phrase; the
/// caller must not have persisted anything yet.
pub fn check_document(content: &str, metadata: &Map<String, Value>) -> Result<()> {
    for key in FORBIDDEN_METADATA_KEYS {
        if metadata.contains_key(key) {
            return Err(Error::ForbiddenContent(format!(
                "Metadata key {key:?} is not allowed in semantic memory. \
                 Use symbolic memory for preferences/decisions and episodic memory for agent lessons."
            )));
        }
    }

    let content_lower = content.to_lowercase();
    for phrase in USER_PREFERENCE_PHRASES
        .iter()
        .chain(DECISION_PHRASES.iter())
        .chain(LESSON_PHRASES.iter())
    {
        if content_lower.contains(phrase) {
            return Err(Error::ForbiddenContent(format!(
                "Content matches forbidden phrase {phrase:?}. \
                 Semantic memory can only store documents and code."
            )));
        }
    }

    Ok(())
}
