//! HTTP API tests against a real listener.

use std::time::Duration;

use fusion_rag::config::Config;
use fusion_rag::server::run_server;
use serde_json::{json, Value};

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Start a server on a free port; returns its base URL.
async fn start(mut config: Config) -> String {
    let port = find_free_port();
    config.server.bind = format!("127.0.0.1:{}", port);
    tokio::spawn(async move {
        run_server(&config).await.unwrap();
    });
    wait_for_server(port).await;
    format!("http://127.0.0.1:{}", port)
}

async fn post(base: &str, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}{}", base, path))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn test_health_reports_empty_generation() {
    let base = start(Config::minimal()).await;
    let health: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["total_chunks"], 0);
    assert!(health["generation"].is_u64());
}

#[tokio::test]
async fn test_ingest_then_search() {
    let base = start(Config::minimal()).await;

    let (status, body) = post(
        &base,
        "/ingest",
        json!({
            "text": "# LangGraph\n\nLangGraph is a library for building stateful, multi-actor applications with LLMs.",
            "filename": "langgraph.md"
        }),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["chunks_created"], 1);
    assert_eq!(body["total_documents_in_index"], 1);

    post(
        &base,
        "/ingest",
        json!({ "text": "Paris is the capital of France.", "filename": "geo.txt", "document_type": "facts" }),
    )
    .await;

    let (status, body) = post(
        &base,
        "/search",
        json!({ "query": "stateful multi-actor LangGraph", "k": 2, "alpha": 0.5 }),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    let results = body["results"].as_array().unwrap();
    assert!(!results.is_empty() && results.len() <= 2);
    assert_eq!(results[0]["metadata"]["source"], "langgraph.md");
    assert_eq!(results[0]["metadata"]["header_1"], "LangGraph");
    assert_eq!(results[0]["source"], "both");
}

#[tokio::test]
async fn test_ingest_empty_text_is_bad_request() {
    let base = start(Config::minimal()).await;
    let (status, body) = post(&base, "/ingest", json!({ "text": "  ", "filename": "x.md" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_search_invalid_k_is_bad_request() {
    let base = start(Config::minimal()).await;
    let (status, body) = post(&base, "/search", json!({ "query": "q", "k": 0 })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"].get("stage").is_none());
}

#[tokio::test]
async fn test_query_with_disabled_generation_reports_stage() {
    let base = start(Config::minimal()).await;
    post(
        &base,
        "/ingest",
        json!({ "text": "Rust has no garbage collector.", "filename": "rust.md" }),
    )
    .await;

    let (status, body) = post(&base, "/query", json!({ "question": "Does Rust have a GC?" })).await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "generation_failed");
    assert_eq!(body["error"]["stage"], "generate");
}

#[tokio::test]
async fn test_query_empty_question_is_bad_request() {
    let base = start(Config::minimal()).await;
    let (status, _) = post(&base, "/query", json!({ "question": "" })).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_corpus_root_loaded_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.md"), "alpha bravo").unwrap();
    std::fs::write(dir.path().join("b.txt"), "charlie delta").unwrap();

    let mut config = Config::minimal();
    config.corpus.root = Some(dir.path().to_path_buf());
    let base = start(config).await;

    let health: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["total_chunks"], 2);
}
