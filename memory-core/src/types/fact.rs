use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{FactCategory, FactSource};

/// Explicit, authoritative fact stored in symbolic memory.
///
/// At most one live fact exists per `(project_id, key)`; writing a new value
/// for an existing key updates the row in place and bumps `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFact {
    /// Unique fact id
    pub id: String,
    /// Owning project (the fact's scope)
    pub project_id: String,
    /// Fact category
    pub category: FactCategory,
    /// Fact key, unique within the project
    pub key: String,
    /// Fact value; callers see the original JSON shape on read
    pub value: serde_json::Value,
    /// Confidence in [0.0, 1.0]
    pub confidence: f64,
    /// Who produced the fact
    pub source: FactSource,
    /// Creation timestamp (RFC 3339 UTC)
    pub created_at: DateTime<Utc>,
    /// Last update timestamp (RFC 3339 UTC)
    pub updated_at: DateTime<Utc>,
}

impl MemoryFact {
    /// Build a new fact with generated id and current timestamps.
    #[must_use]
    pub fn new(
        project_id: impl Into<String>,
        category: FactCategory,
        key: impl Into<String>,
        value: serde_json::Value,
        confidence: f64,
        source: FactSource,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            category,
            key: key.into(),
            value,
            confidence,
            source,
            created_at: now,
            updated_at: now,
        }
    }

    /// Render the value for prompt injection (objects become `k: v` pairs).
    #[must_use]
    pub fn value_display(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => format!("{k}: {s}"),
                    other => format!("{k}: {other}"),
                })
                .collect::<Vec<_>>()
                .join(", "),
            other => other.to_string(),
        }
    }

    /// RFC 3339 rendering used on the wire and in audit rows.
    #[must_use]
    pub fn updated_at_rfc3339(&self) -> String {
        self.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// Audit log operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOperation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditOperation::Create => "create",
            AuditOperation::Update => "update",
            AuditOperation::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// One row of the symbolic store's audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub fact_id: String,
    pub operation: AuditOperation,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

/// Aggregate statistics for a project's symbolic store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactStats {
    pub total_facts: usize,
    pub by_category: std::collections::BTreeMap<String, usize>,
    pub by_source: std::collections::BTreeMap<String, usize>,
    pub avg_confidence: f64,
}
