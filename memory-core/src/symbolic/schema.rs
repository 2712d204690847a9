//! Database schema for the symbolic store.

/// SQL to create the memory facts table.
///
/// Timestamps are stored twice: RFC 3339 text (the wire form) and epoch
/// microseconds for ordering, so no SQL date math is ever needed.
pub const CREATE_FACTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS memory_facts (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL,
    category TEXT NOT NULL,
    key TEXT NOT NULL,
    value_json TEXT NOT NULL,
    confidence REAL NOT NULL,
    source TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    updated_at_ts INTEGER NOT NULL,
    UNIQUE(project_id, key)
)
"#;

/// SQL to create the audit log table.
///
/// Audit rows outlive their facts, so `fact_id` is intentionally not a
/// foreign key.
pub const CREATE_AUDIT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fact_id TEXT NOT NULL,
    operation TEXT NOT NULL,
    before_json TEXT,
    after_json TEXT,
    changed_by TEXT NOT NULL,
    changed_at TEXT NOT NULL
)
"#;

/// Index on facts for per-project queries ordered by freshness.
pub const CREATE_FACTS_PROJECT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_facts_project_updated
ON memory_facts(project_id, updated_at_ts DESC)
"#;

/// Index on the audit log for chronological reads.
pub const CREATE_AUDIT_TIME_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_audit_changed_at
ON audit_log(changed_at DESC)
"#;
