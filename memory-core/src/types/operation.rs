use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::OpResult;

/// In-memory record of one tool call, kept in the backend's 100-op ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub tool_name: String,
    pub project_id: String,
    pub arguments: serde_json::Value,
    pub result: OpResult,
    /// Short outcome tag (`completed`, `failed`, `validation_failed`)
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl OperationRecord {
    /// Per-call `auto_learn` override, if the caller set one.
    #[must_use]
    pub fn auto_learn_override(&self) -> Option<bool> {
        self.arguments.get("auto_learn").and_then(|v| v.as_bool())
    }
}
