//! Definitions for the memory tool surface.

use serde_json::json;

use crate::types::Tool;

/// All tools exposed by the memory server.
#[must_use]
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool::new(
            "list_projects",
            "List registered projects",
            json!({
                "type": "object",
                "properties": {
                    "scope_type": {
                        "type": "string",
                        "description": "Optional status filter (active, archived)",
                        "enum": ["active", "archived"]
                    },
                    "auto_learn": {"type": "boolean"}
                }
            }),
        ),
        Tool::new(
            "list_sources",
            "List document sources in a project's semantic memory",
            json!({
                "type": "object",
                "properties": {
                    "project_id": {"type": "string", "description": "Project identifier"},
                    "source_type": {
                        "type": "string",
                        "description": "Optional document type filter (doc, code, note, article, reference)"
                    },
                    "auto_learn": {"type": "boolean"}
                },
                "required": ["project_id"]
            }),
        ),
        Tool::new(
            "get_context",
            "Get project context under the authority hierarchy \
             (symbolic > episodic > semantic)",
            json!({
                "type": "object",
                "properties": {
                    "project_id": {"type": "string", "description": "Project identifier"},
                    "context_type": {
                        "type": "string",
                        "description": "Which memory types to include",
                        "enum": ["all", "symbolic", "episodic", "semantic"],
                        "default": "all"
                    },
                    "query": {
                        "type": "string",
                        "description": "Query for semantic retrieval; without one, semantic context is empty"
                    },
                    "max_results": {"type": "integer", "default": 10},
                    "auto_learn": {"type": "boolean"}
                },
                "required": ["project_id"]
            }),
        ),
        Tool::new(
            "search",
            "Search across memory types; results are merged symbolic first, \
             episodic next, semantic last",
            json!({
                "type": "object",
                "properties": {
                    "project_id": {"type": "string", "description": "Project identifier"},
                    "query": {"type": "string", "description": "Search query"},
                    "memory_type": {
                        "type": "string",
                        "enum": ["all", "symbolic", "episodic", "semantic"],
                        "default": "all"
                    },
                    "top_k": {"type": "integer", "default": 10},
                    "situation_contains": {
                        "type": "string",
                        "description": "For episodic search, filter by situation content"
                    },
                    "auto_learn": {"type": "boolean"}
                },
                "required": ["project_id", "query"]
            }),
        ),
        Tool::new(
            "ingest_file",
            "Ingest a staged file into semantic memory (path must be inside \
             the upload sandbox)",
            json!({
                "type": "object",
                "properties": {
                    "project_id": {"type": "string", "description": "Project identifier"},
                    "file_path": {"type": "string", "description": "Absolute path to the staged file"},
                    "source_type": {"type": "string", "default": "file"},
                    "metadata": {"type": "object", "description": "Optional metadata to attach"},
                    "auto_learn": {"type": "boolean"}
                },
                "required": ["project_id", "file_path"]
            }),
        ),
        Tool::new(
            "add_fact",
            "Add an authoritative fact to symbolic memory (upsert by key)",
            json!({
                "type": "object",
                "properties": {
                    "project_id": {"type": "string", "description": "Project identifier"},
                    "fact_key": {"type": "string", "description": "Fact key, unique within the project"},
                    "fact_value": {"description": "Fact value (any JSON shape)"},
                    "confidence": {"type": "number", "default": 0.9},
                    "category": {
                        "type": "string",
                        "enum": ["preference", "constraint", "decision", "fact"]
                    },
                    "auto_learn": {"type": "boolean"}
                },
                "required": ["project_id", "fact_key", "fact_value"]
            }),
        ),
        Tool::new(
            "add_episode",
            "Add an advisory episode to episodic memory",
            json!({
                "type": "object",
                "properties": {
                    "project_id": {"type": "string", "description": "Project identifier"},
                    "title": {"type": "string", "description": "Episode title"},
                    "content": {
                        "type": "string",
                        "description": "Episode content; Situation:/Action:/Outcome:/Lesson: \
                                        line prefixes are parsed when present"
                    },
                    "lesson_type": {
                        "type": "string",
                        "enum": ["success", "pattern", "mistake", "failure", "general"]
                    },
                    "quality": {"type": "number", "default": 0.8},
                    "auto_learn": {"type": "boolean"}
                },
                "required": ["project_id", "title", "content"]
            }),
        ),
        Tool::new(
            "analyze_conversation",
            "Extract facts and episodes from a conversation exchange",
            json!({
                "type": "object",
                "properties": {
                    "project_id": {"type": "string", "description": "Project identifier"},
                    "user_message": {"type": "string"},
                    "agent_response": {"type": "string", "default": ""},
                    "context": {"type": "object"},
                    "auto_store": {"type": "boolean", "default": true},
                    "return_only": {"type": "boolean", "default": false},
                    "extraction_mode": {
                        "type": "string",
                        "enum": ["heuristic", "llm", "hybrid"],
                        "default": "heuristic"
                    },
                    "auto_learn": {"type": "boolean"}
                },
                "required": ["project_id", "user_message"]
            }),
        ),
    ]
}
