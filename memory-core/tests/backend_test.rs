//! End-to-end scenarios against the backend façade.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use engram_core::backend::{
    AddEpisodeParams, AddFactParams, AnalyzeConversationParams, GetContextParams,
    IngestFileParams, ListProjectsParams, MemoryBackend, SearchParams,
};
use engram_core::config::{MemoryConfig, VectorBackend};
use engram_core::embeddings::HashEmbedder;

fn test_config(dir: &TempDir) -> MemoryConfig {
    let mut config = MemoryConfig::default();
    config.vector_backend = VectorBackend::Legacy;
    config.upload.directory = dir.path().join("uploads");
    config
}

async fn backend(dir: &TempDir) -> Arc<MemoryBackend> {
    MemoryBackend::new(
        test_config(dir),
        &dir.path().join("data"),
        Arc::new(HashEmbedder::default()),
        None,
    )
    .await
    .unwrap()
}

fn add_fact_params(key: &str, value: serde_json::Value, confidence: f64) -> AddFactParams {
    AddFactParams {
        project_id: "demo".to_string(),
        fact_key: key.to_string(),
        fact_value: value,
        confidence,
        category: None,
        auto_learn: None,
    }
}

#[tokio::test]
async fn symbolic_upsert_keeps_single_row() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    let first = backend
        .add_fact(&add_fact_params("output_format", json!("json"), 0.9))
        .await
        .unwrap();
    assert_eq!(first["status"], "success");
    assert_eq!(first["authority"], "authoritative");

    let second = backend
        .add_fact(&add_fact_params("output_format", json!("markdown"), 0.95))
        .await
        .unwrap();
    assert_eq!(second["value"], "markdown");
    assert_eq!(second["confidence"], 0.95);
    assert_eq!(first["fact_id"], second["fact_id"]);

    // Only one live row for the key.
    let results = backend
        .search(&SearchParams {
            project_id: "demo".to_string(),
            query: "output_format".to_string(),
            memory_type: "symbolic".to_string(),
            top_k: 10,
            situation_contains: None,
            auto_learn: None,
        })
        .await
        .unwrap();
    assert_eq!(results["results"].as_array().unwrap().len(), 1);
    assert_eq!(results["results"][0]["value"], "markdown");
}

#[tokio::test]
async fn episode_rejected_when_lesson_restates_situation() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    let err = backend
        .add_episode(&AddEpisodeParams {
            project_id: "demo".to_string(),
            title: "T".to_string(),
            content: "Situation: X\nAction: X\nOutcome: success\nLesson: X".to_string(),
            lesson_type: None,
            quality: 0.8,
            auto_learn: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "Conflict");
}

#[tokio::test]
async fn forbidden_content_is_rejected_at_ingest() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    let uploads = dir.path().join("uploads");
    std::fs::create_dir_all(&uploads).unwrap();
    let file = uploads.join("prefs.md");
    std::fs::write(&file, "the user prefers dark mode").unwrap();

    let err = backend
        .ingest_file(&IngestFileParams {
            project_id: "demo".to_string(),
            file_path: file.to_string_lossy().into_owned(),
            source_type: "file".to_string(),
            metadata: None,
            auto_learn: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ForbiddenContent");
}

#[tokio::test]
async fn upload_sandbox_rejects_outside_paths() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    let err = backend
        .ingest_file(&IngestFileParams {
            project_id: "demo".to_string(),
            file_path: "/etc/passwd".to_string(),
            source_type: "file".to_string(),
            metadata: None,
            auto_learn: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "UploadRejected");
    assert!(err.to_string().contains("within upload directory"));
}

#[tokio::test]
async fn semantic_search_returns_cited_chunks() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    let uploads = dir.path().join("uploads");
    std::fs::create_dir_all(&uploads).unwrap();
    let file = uploads.join("auth.md");
    std::fs::write(&file, "Auth uses bearer tokens with hourly refresh.").unwrap();

    let ingested = backend
        .ingest_file(&IngestFileParams {
            project_id: "demo".to_string(),
            file_path: file.to_string_lossy().into_owned(),
            source_type: "file".to_string(),
            metadata: None,
            auto_learn: None,
        })
        .await
        .unwrap();
    assert_eq!(ingested["status"], "success");
    assert!(ingested["chunk_count"].as_u64().unwrap() >= 1);

    let results = backend
        .search(&SearchParams {
            project_id: "demo".to_string(),
            query: "Auth uses bearer tokens with hourly refresh.".to_string(),
            memory_type: "semantic".to_string(),
            top_k: 5,
            situation_contains: None,
            auto_learn: None,
        })
        .await
        .unwrap();

    let hits = results["results"].as_array().unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0]["authority"], "non-authoritative");
    let citation = hits[0]["citation"].as_str().unwrap();
    assert!(citation.ends_with(":0"), "citation was {citation}");
}

#[tokio::test]
async fn get_context_returns_authority_annotated_arrays() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    backend
        .add_fact(&add_fact_params("language", json!("rust"), 0.9))
        .await
        .unwrap();
    backend
        .add_episode(&AddEpisodeParams {
            project_id: "demo".to_string(),
            title: "search strategy".to_string(),
            content: "Situation: large repo\nAction: searched filenames first\n\
                      Outcome: success\nLesson: filename search narrows large repos fast"
                .to_string(),
            lesson_type: None,
            quality: 0.85,
            auto_learn: None,
        })
        .await
        .unwrap();

    let context = backend
        .get_context(&GetContextParams {
            project_id: "demo".to_string(),
            context_type: "all".to_string(),
            query: Some("auth".to_string()),
            max_results: 5,
            auto_learn: None,
        })
        .await
        .unwrap();

    let symbolic = context["symbolic"].as_array().unwrap();
    assert_eq!(symbolic.len(), 1);
    assert_eq!(symbolic[0]["authority"], "authoritative");

    let episodic = context["episodic"].as_array().unwrap();
    assert_eq!(episodic.len(), 1);
    assert_eq!(episodic[0]["authority"], "advisory");

    // No matching documents: semantic is present but empty.
    assert!(context["semantic"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn get_context_without_query_skips_semantic() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    let context = backend
        .get_context(&GetContextParams {
            project_id: "demo".to_string(),
            context_type: "semantic".to_string(),
            query: None,
            max_results: 5,
            auto_learn: None,
        })
        .await
        .unwrap();
    assert!(context["semantic"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn list_projects_reflects_created_projects() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    backend
        .add_fact(&add_fact_params("k", json!("v"), 0.9))
        .await
        .unwrap();

    let listed = backend.list_projects(&ListProjectsParams::default()).await.unwrap();
    assert_eq!(listed["status"], "success");
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["authority"], "system");
    let project_id = listed["projects"][0]["project_id"].as_str().unwrap();
    assert!(project_id.starts_with("demo-"));
}

#[tokio::test]
async fn metrics_totals_are_monotonic_per_tool() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    let mut last = 0u64;
    for _ in 0..3 {
        backend
            .add_fact(&add_fact_params("k", json!("v"), 0.9))
            .await
            .unwrap();
        let stats = backend.metrics().to_json("demo");
        let total = stats["by_tool"]["add_fact"]["calls"].as_u64().unwrap();
        assert!(total > last);
        last = total;
    }

    // Errors are counted too.
    let _ = backend
        .add_fact(&add_fact_params("bad key!", json!("v"), 0.9))
        .await
        .unwrap_err();
    let stats = backend.metrics().to_json("demo");
    assert_eq!(stats["by_tool"]["add_fact"]["errors"].as_u64().unwrap(), 1);
}

#[tokio::test]
async fn operation_ring_records_calls() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    backend
        .add_fact(&add_fact_params("k", json!("v"), 0.9))
        .await
        .unwrap();
    let _ = backend
        .add_fact(&add_fact_params("bad key!", json!("v"), 0.9))
        .await;

    let records = backend.operation_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].tool_name, "add_fact");
    assert!(records[0].result.is_success());
    assert!(!records[1].result.is_success());
    assert!(records[1].error.is_some());
}

#[tokio::test]
async fn analyze_conversation_stores_extracted_facts() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    let analyzed = backend
        .analyze_conversation(&AnalyzeConversationParams {
            project_id: "demo".to_string(),
            user_message: "The API endpoint is https://api.example.com/v2".to_string(),
            agent_response: String::new(),
            context: None,
            auto_store: true,
            return_only: false,
            extraction_mode: "heuristic".to_string(),
            auto_learn: None,
        })
        .await
        .unwrap();

    assert_eq!(analyzed["status"], "success");
    assert!(analyzed["facts_stored"].as_u64().unwrap() >= 1);

    let results = backend
        .search(&SearchParams {
            project_id: "demo".to_string(),
            query: "api_endpoint".to_string(),
            memory_type: "symbolic".to_string(),
            top_k: 5,
            situation_contains: None,
            auto_learn: None,
        })
        .await
        .unwrap();
    assert_eq!(results["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn analyze_conversation_return_only_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    let analyzed = backend
        .analyze_conversation(&AnalyzeConversationParams {
            project_id: "demo".to_string(),
            user_message: "I prefer tabs over spaces".to_string(),
            agent_response: String::new(),
            context: None,
            auto_store: true,
            return_only: true,
            extraction_mode: "heuristic".to_string(),
            auto_learn: None,
        })
        .await
        .unwrap();

    assert_eq!(analyzed["facts_stored"], 0);
    assert!(!analyzed["facts"].as_array().unwrap().is_empty());

    let results = backend
        .search(&SearchParams {
            project_id: "demo".to_string(),
            query: "preference".to_string(),
            memory_type: "symbolic".to_string(),
            top_k: 5,
            situation_contains: None,
            auto_learn: None,
        })
        .await
        .unwrap();
    assert!(results["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn auto_learning_stores_episode_after_repeated_failures() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.automatic_learning.enabled = true;
    let backend = MemoryBackend::new(
        config,
        &dir.path().join("data"),
        Arc::new(HashEmbedder::default()),
        None,
    )
    .await
    .unwrap();

    // Two consecutive failures on the same tool fire the pattern detector.
    for _ in 0..2 {
        let _ = backend
            .ingest_file(&IngestFileParams {
                project_id: "demo".to_string(),
                file_path: "/etc/passwd".to_string(),
                source_type: "file".to_string(),
                metadata: None,
                auto_learn: None,
            })
            .await
            .unwrap_err();
    }

    backend.drain_learning_queue().await;

    let results = backend
        .search(&SearchParams {
            project_id: "demo".to_string(),
            query: "Strategy".to_string(),
            memory_type: "episodic".to_string(),
            top_k: 10,
            situation_contains: None,
            auto_learn: None,
        })
        .await
        .unwrap();
    let hits = results["results"].as_array().unwrap();
    assert!(!hits.is_empty(), "expected an auto-stored episode");
    assert!(hits[0]["lesson"].as_str().unwrap().starts_with("Strategy:"));
}

#[tokio::test]
async fn auto_learn_false_suppresses_tracking() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.automatic_learning.enabled = true;
    let backend = MemoryBackend::new(
        config,
        &dir.path().join("data"),
        Arc::new(HashEmbedder::default()),
        None,
    )
    .await
    .unwrap();

    for _ in 0..2 {
        let _ = backend
            .ingest_file(&IngestFileParams {
                project_id: "demo".to_string(),
                file_path: "/etc/passwd".to_string(),
                source_type: "file".to_string(),
                metadata: None,
                auto_learn: Some(false),
            })
            .await
            .unwrap_err();
    }
    backend.drain_learning_queue().await;

    let results = backend
        .search(&SearchParams {
            project_id: "demo".to_string(),
            query: "Strategy".to_string(),
            memory_type: "episodic".to_string(),
            top_k: 10,
            situation_contains: None,
            auto_learn: None,
        })
        .await
        .unwrap();
    assert!(results["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn project_name_and_id_resolve_to_same_stores() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    backend
        .add_fact(&add_fact_params("style", json!("terse"), 0.9))
        .await
        .unwrap();

    let listed = backend.list_projects(&ListProjectsParams::default()).await.unwrap();
    let project_id = listed["projects"][0]["project_id"].as_str().unwrap().to_string();

    // Querying by full id reaches the same store as by name.
    let results = backend
        .search(&SearchParams {
            project_id,
            query: "style".to_string(),
            memory_type: "symbolic".to_string(),
            top_k: 5,
            situation_contains: None,
            auto_learn: None,
        })
        .await
        .unwrap();
    assert_eq!(results["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn ingest_delete_reingest_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    // Stage the same content twice (the first upload is auto-deleted).
    let uploads = dir.path().join("uploads");
    std::fs::create_dir_all(&uploads).unwrap();
    let file = uploads.join("doc.md");

    std::fs::write(&file, "Stable content for chunk ids.").unwrap();
    let first = backend
        .ingest_file(&IngestFileParams {
            project_id: "demo".to_string(),
            file_path: file.to_string_lossy().into_owned(),
            source_type: "file".to_string(),
            metadata: None,
            auto_learn: None,
        })
        .await
        .unwrap();

    std::fs::write(&file, "Stable content for chunk ids.").unwrap();
    let second = backend
        .ingest_file(&IngestFileParams {
            project_id: "demo".to_string(),
            file_path: file.to_string_lossy().into_owned(),
            source_type: "file".to_string(),
            metadata: None,
            auto_learn: None,
        })
        .await
        .unwrap();

    // Same path, same content: stable document id and chunk count.
    assert_eq!(first["doc_id"], second["doc_id"]);
    assert_eq!(first["chunk_count"], second["chunk_count"]);
}

#[tokio::test]
async fn path_traversal_inside_sandbox_prefix_is_rejected() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir).await;

    let uploads = dir.path().join("uploads");
    std::fs::create_dir_all(&uploads).unwrap();
    let outside = dir.path().join("secret.md");
    std::fs::write(&outside, "secret").unwrap();

    let sneaky = uploads.join("../secret.md");
    let err = backend
        .ingest_file(&IngestFileParams {
            project_id: "demo".to_string(),
            file_path: sneaky.to_string_lossy().into_owned(),
            source_type: "file".to_string(),
            metadata: None,
            auto_learn: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "UploadRejected");
}
