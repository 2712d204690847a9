//! Database schema for the episodic store.

/// SQL to create the episodes table.
pub const CREATE_EPISODES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS episodes (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL,
    situation TEXT NOT NULL,
    action TEXT NOT NULL,
    outcome TEXT NOT NULL,
    lesson TEXT NOT NULL,
    confidence REAL NOT NULL,
    created_at TEXT NOT NULL,
    created_at_ts INTEGER NOT NULL
)
"#;

/// Index for per-project recency queries.
pub const CREATE_EPISODES_RECENCY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_episodes_project_recency
ON episodes(project_id, created_at_ts DESC)
"#;
