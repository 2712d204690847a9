//! Typed parameters for the tool operations.
//!
//! Defaults mirror the wire contract, so the MCP layer can deserialize
//! caller JSON straight into these structs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_context_type() -> String {
    "all".to_string()
}

fn default_memory_type() -> String {
    "all".to_string()
}

fn default_source_type() -> String {
    "file".to_string()
}

fn default_extraction_mode() -> String {
    "heuristic".to_string()
}

fn default_max_results() -> usize {
    10
}

fn default_top_k() -> usize {
    10
}

fn default_confidence() -> f64 {
    0.9
}

fn default_quality() -> f64 {
    0.8
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListProjectsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_learn: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSourcesParams {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_learn: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetContextParams {
    pub project_id: String,
    #[serde(default = "default_context_type")]
    pub context_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_learn: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub project_id: String,
    pub query: String,
    #[serde(default = "default_memory_type")]
    pub memory_type: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub situation_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_learn: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFileParams {
    pub project_id: String,
    pub file_path: String,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_learn: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFactParams {
    pub project_id: String,
    pub fact_key: String,
    pub fact_value: Value,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_learn: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEpisodeParams {
    pub project_id: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_type: Option<String>,
    #[serde(default = "default_quality")]
    pub quality: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_learn: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeConversationParams {
    pub project_id: String,
    pub user_message: String,
    #[serde(default)]
    pub agent_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default = "default_true")]
    pub auto_store: bool,
    #[serde(default)]
    pub return_only: bool,
    #[serde(default = "default_extraction_mode")]
    pub extraction_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_learn: Option<bool>,
}
