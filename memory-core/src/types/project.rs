use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::ProjectStatus;

/// Tenant boundary owning its own symbolic, episodic, and semantic data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Globally unique id: `{name}-{short_uuid}`
    pub project_id: String,
    /// Human-chosen name, 1-100 chars, no path metacharacters
    pub name: String,
    /// Eight hex chars derived from a random UUID
    pub short_uuid: String,
    /// Directory of the project's semantic index
    pub chroma_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: ProjectStatus,
    /// Free-form caller metadata
    pub metadata: serde_json::Value,
}
