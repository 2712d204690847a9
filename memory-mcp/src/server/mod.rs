//! Memory tool server: definitions and dispatch.

pub mod tool_definitions;

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info};

use engram_core::MemoryBackend;
use engram_core::backend::{
    AddEpisodeParams, AddFactParams, AnalyzeConversationParams, GetContextParams,
    IngestFileParams, ListProjectsParams, ListSourcesParams, SearchParams,
};
use engram_core::error::Error;

use crate::types::Tool;

/// Wire-agnostic tool server over a [`MemoryBackend`].
pub struct MemoryServer {
    backend: Arc<MemoryBackend>,
    tools: Vec<Tool>,
}

impl MemoryServer {
    #[must_use]
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        let tools = tool_definitions::tool_definitions();
        info!(tools = tools.len(), "memory server initialized");
        Self { backend, tools }
    }

    /// The tool definitions exposed to clients.
    #[must_use]
    pub fn list_tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Look up one tool definition by name.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<MemoryBackend> {
        &self.backend
    }

    /// Dispatch one tool call.
    ///
    /// Never fails across the wire: unknown tools, malformed arguments,
    /// backend errors, and exceeded deadlines all come back as the error
    /// envelope. A `timeout_ms` argument sets a per-call deadline;
    /// store writes stay atomic when it fires.
    pub async fn handle_tool_call(&self, name: &str, mut arguments: Value) -> Value {
        debug!(tool = name, "dispatching tool call");

        let deadline = arguments
            .as_object_mut()
            .and_then(|map| map.remove("timeout_ms"))
            .and_then(|v| v.as_u64());

        match deadline {
            Some(ms) => {
                let deadline = std::time::Duration::from_millis(ms);
                match tokio::time::timeout(deadline, self.dispatch(name, arguments)).await {
                    Ok(response) => response,
                    Err(_) => {
                        let err = Error::Timeout;
                        error_envelope(name, err.kind(), &err.to_string())
                    }
                }
            }
            None => self.dispatch(name, arguments).await,
        }
    }

    async fn dispatch(&self, name: &str, arguments: Value) -> Value {
        let result = match name {
            "list_projects" => match parse::<ListProjectsParams>(name, arguments) {
                Ok(params) => self.backend.list_projects(&params).await,
                Err(envelope) => return envelope,
            },
            "list_sources" => match parse::<ListSourcesParams>(name, arguments) {
                Ok(params) => self.backend.list_sources(&params).await,
                Err(envelope) => return envelope,
            },
            "get_context" => match parse::<GetContextParams>(name, arguments) {
                Ok(params) => self.backend.get_context(&params).await,
                Err(envelope) => return envelope,
            },
            "search" => match parse::<SearchParams>(name, arguments) {
                Ok(params) => self.backend.search(&params).await,
                Err(envelope) => return envelope,
            },
            "ingest_file" => match parse::<IngestFileParams>(name, arguments) {
                Ok(params) => self.backend.ingest_file(&params).await,
                Err(envelope) => return envelope,
            },
            "add_fact" => match parse::<AddFactParams>(name, arguments) {
                Ok(params) => self.backend.add_fact(&params).await,
                Err(envelope) => return envelope,
            },
            "add_episode" => match parse::<AddEpisodeParams>(name, arguments) {
                Ok(params) => self.backend.add_episode(&params).await,
                Err(envelope) => return envelope,
            },
            "analyze_conversation" => match parse::<AnalyzeConversationParams>(name, arguments) {
                Ok(params) => self.backend.analyze_conversation(&params).await,
                Err(envelope) => return envelope,
            },
            unknown => {
                return error_envelope(
                    unknown,
                    "InvalidArgument",
                    &format!("Unknown tool: {unknown}"),
                );
            }
        };

        match result {
            Ok(response) => response,
            Err(e) => error_envelope(name, e.kind(), &e.to_string()),
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    tool: &str,
    arguments: Value,
) -> std::result::Result<T, Value> {
    serde_json::from_value(arguments).map_err(|e| {
        let err = Error::InvalidArgument(format!("Malformed arguments: {e}"));
        error_envelope(tool, err.kind(), &err.to_string())
    })
}

/// The common error shape: `{status, tool, error, message}`.
fn error_envelope(tool: &str, kind: &str, message: &str) -> Value {
    json!({
        "status": "error",
        "tool": tool,
        "error": kind,
        "message": message,
    })
}
