use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Advisory lesson learned from a past situation.
///
/// All four text fields are required and non-empty, and `lesson` must be an
/// abstraction rather than a restatement of `situation` (stores reject
/// `lesson == situation`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Unique episode id
    pub id: String,
    /// Owning project
    pub project_id: String,
    /// What was going on
    pub situation: String,
    /// What was done
    pub action: String,
    /// What happened
    pub outcome: String,
    /// Abstracted, reusable lesson
    pub lesson: String,
    /// Confidence in [0.0, 1.0]
    pub confidence: f64,
    /// Creation timestamp (RFC 3339 UTC)
    pub created_at: DateTime<Utc>,
}

impl Episode {
    /// Build a new episode with generated id and current timestamp.
    #[must_use]
    pub fn new(
        project_id: impl Into<String>,
        situation: impl Into<String>,
        action: impl Into<String>,
        outcome: impl Into<String>,
        lesson: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            situation: situation.into(),
            action: action.into(),
            outcome: outcome.into(),
            lesson: lesson.into(),
            confidence,
            created_at: Utc::now(),
        }
    }
}

/// Aggregate statistics for a project's episodic store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub total_episodes: usize,
    pub avg_confidence: f64,
    pub newest: Option<DateTime<Utc>>,
    pub oldest: Option<DateTime<Utc>>,
}
