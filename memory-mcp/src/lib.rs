//! # Engram MCP
//!
//! Wire-agnostic MCP tool surface for the engram memory engine. This crate
//! owns the tool definitions (names, descriptions, JSON input schemas) and
//! the dispatch layer that turns a `(tool name, JSON arguments)` pair into
//! a JSON response. The façade never throws across the wire: every failure
//! becomes an error envelope
//! `{"status": "error", "tool": ..., "error": <kind>, "message": ...}`.
//!
//! The actual transport (stdio/HTTP/SSE) is a host concern; hosts hand
//! incoming calls to [`server::MemoryServer::handle_tool_call`].
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use engram_core::MemoryBackend;
//! use engram_core::config::MemoryConfig;
//! use engram_core::embeddings::HashEmbedder;
//! use engram_mcp::server::MemoryServer;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = MemoryBackend::new(
//!         MemoryConfig::default(),
//!         Path::new("./data"),
//!         Arc::new(HashEmbedder::default()),
//!         None,
//!     )
//!     .await?;
//!     let server = MemoryServer::new(backend);
//!
//!     for tool in server.list_tools() {
//!         println!("{}: {}", tool.name, tool.description);
//!     }
//!
//!     let response = server
//!         .handle_tool_call(
//!             "add_fact",
//!             json!({"project_id": "demo", "fact_key": "lang", "fact_value": "rust"}),
//!         )
//!         .await;
//!     println!("{response}");
//!     Ok(())
//! }
//! ```

pub mod server;
pub mod types;

pub use server::MemoryServer;
pub use types::Tool;
