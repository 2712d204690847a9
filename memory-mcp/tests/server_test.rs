//! Wire-level dispatch tests for the memory tool server.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use engram_core::MemoryBackend;
use engram_core::config::{MemoryConfig, VectorBackend};
use engram_core::embeddings::HashEmbedder;
use engram_mcp::server::MemoryServer;

async fn server(dir: &TempDir) -> MemoryServer {
    let mut config = MemoryConfig::default();
    config.vector_backend = VectorBackend::Legacy;
    config.upload.directory = dir.path().join("uploads");

    let backend = MemoryBackend::new(
        config,
        &dir.path().join("data"),
        Arc::new(HashEmbedder::default()),
        None,
    )
    .await
    .unwrap();
    MemoryServer::new(backend)
}

#[tokio::test]
async fn tools_are_listed_and_resolvable() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    assert_eq!(server.list_tools().len(), 8);
    assert!(server.get_tool("search").is_some());
    assert!(server.get_tool("execute_code").is_none());
}

#[tokio::test]
async fn add_fact_round_trips_through_dispatch() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let response = server
        .handle_tool_call(
            "add_fact",
            json!({
                "project_id": "demo",
                "fact_key": "output_format",
                "fact_value": "json",
                "confidence": 0.9
            }),
        )
        .await;
    assert_eq!(response["status"], "success");
    assert_eq!(response["authority"], "authoritative");

    let updated = server
        .handle_tool_call(
            "add_fact",
            json!({
                "project_id": "demo",
                "fact_key": "output_format",
                "fact_value": "markdown",
                "confidence": 0.95
            }),
        )
        .await;
    assert_eq!(updated["value"], "markdown");
    assert_eq!(updated["fact_id"], response["fact_id"]);
}

#[tokio::test]
async fn unknown_tools_return_the_error_envelope() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let response = server.handle_tool_call("execute_code", json!({})).await;
    assert_eq!(response["status"], "error");
    assert_eq!(response["tool"], "execute_code");
    assert_eq!(response["error"], "InvalidArgument");
}

#[tokio::test]
async fn malformed_arguments_return_the_error_envelope() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    // search requires `query`.
    let response = server
        .handle_tool_call("search", json!({"project_id": "demo"}))
        .await;
    assert_eq!(response["status"], "error");
    assert_eq!(response["error"], "InvalidArgument");
    assert!(response["message"].as_str().unwrap().contains("Malformed arguments"));
}

#[tokio::test]
async fn upload_rejection_carries_its_kind() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let response = server
        .handle_tool_call(
            "ingest_file",
            json!({"project_id": "demo", "file_path": "/etc/passwd"}),
        )
        .await;
    assert_eq!(response["status"], "error");
    assert_eq!(response["tool"], "ingest_file");
    assert_eq!(response["error"], "UploadRejected");
    assert!(
        response["message"]
            .as_str()
            .unwrap()
            .contains("within upload directory")
    );
}

#[tokio::test]
async fn abstraction_conflict_surfaces_through_dispatch() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let response = server
        .handle_tool_call(
            "add_episode",
            json!({
                "project_id": "demo",
                "title": "T",
                "content": "Situation: X\nAction: X\nOutcome: success\nLesson: X"
            }),
        )
        .await;
    assert_eq!(response["status"], "error");
    assert_eq!(response["error"], "Conflict");
}

#[tokio::test]
async fn search_merges_memory_types_in_authority_order() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    server
        .handle_tool_call(
            "add_fact",
            json!({"project_id": "demo", "fact_key": "auth_provider", "fact_value": "oauth"}),
        )
        .await;
    server
        .handle_tool_call(
            "add_episode",
            json!({
                "project_id": "demo",
                "title": "auth debugging",
                "content": "Situation: auth flow failed\nAction: checked token expiry\n\
                            Outcome: success\nLesson: check auth token expiry before retrying"
            }),
        )
        .await;

    let response = server
        .handle_tool_call(
            "search",
            json!({"project_id": "demo", "query": "auth", "memory_type": "all", "top_k": 10}),
        )
        .await;
    assert_eq!(response["status"], "success");

    let results = response["results"].as_array().unwrap();
    assert!(results.len() >= 2);
    assert_eq!(results[0]["type"], "symbolic");
    assert_eq!(results[0]["authority"], "authoritative");
    assert_eq!(results[1]["type"], "episodic");
    assert_eq!(results[1]["authority"], "advisory");
}

#[tokio::test]
async fn get_context_requires_query_for_semantic() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let response = server
        .handle_tool_call(
            "get_context",
            json!({"project_id": "demo", "context_type": "all", "max_results": 5}),
        )
        .await;
    assert_eq!(response["status"], "success");
    assert!(response["semantic"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn analyze_conversation_reports_extractions() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let response = server
        .handle_tool_call(
            "analyze_conversation",
            json!({
                "project_id": "demo",
                "user_message": "We decided to use postgres for storage",
                "return_only": true
            }),
        )
        .await;
    assert_eq!(response["status"], "success");
    assert!(!response["facts"].as_array().unwrap().is_empty());
    assert_eq!(response["facts_stored"], 0);
}

#[tokio::test]
async fn exceeded_deadline_returns_timeout() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let response = server
        .handle_tool_call(
            "add_fact",
            json!({
                "project_id": "demo",
                "fact_key": "k",
                "fact_value": "v",
                "timeout_ms": 0
            }),
        )
        .await;
    assert_eq!(response["status"], "error");
    assert_eq!(response["error"], "Timeout");
}

#[tokio::test]
async fn invalid_enum_values_are_invalid_arguments() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let response = server
        .handle_tool_call(
            "search",
            json!({"project_id": "demo", "query": "x", "memory_type": "vibes"}),
        )
        .await;
    assert_eq!(response["status"], "error");
    assert_eq!(response["error"], "InvalidArgument");
}
