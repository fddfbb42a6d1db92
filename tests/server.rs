//! HTTP API tests against an in-process server over a memory store with
//! the local-only embedder.

use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;

use docrag::config::parse_config;
use docrag::json_store::JsonFileStore;
use docrag::server;
use docrag::service::RagService;
use docrag_core::embedding::ChainedEmbedder;
use docrag_core::store::memory::InMemoryStore;
use docrag_core::store::DocumentStore;

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Start a server over a fresh memory store and return its base URL.
async fn start_server() -> String {
    start_server_with(Arc::new(InMemoryStore::new())).await
}

async fn start_server_with(store: Arc<dyn DocumentStore>) -> String {
    let cfg = parse_config("[store]\nbackend = \"memory\"\n\n[retrieval]\ntop_k = 5\ncontext_results = 2\n")
        .unwrap();
    let service = Arc::new(RagService::new(
        store,
        Arc::new(ChainedEmbedder::local()),
        &cfg,
    ));

    let port = find_free_port();
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap();
    tokio::spawn(async move {
        server::serve(listener, service).await.unwrap();
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

fn migration_corpus() -> Value {
    json!({
        "documents": [{
            "id": "d1",
            "title": "迁徙指南",
            "content": "候鸟每年秋季南飞越冬",
            "filename": "迁徙指南.txt",
            "fileType": "txt",
            "size": 30,
            "uploadedAt": "2024-05-01T08:30:00Z"
        }],
        "chunks": [{
            "id": "c1",
            "documentId": "d1",
            "content": "候鸟每年秋季南飞越冬",
            "chunkIndex": 0,
            "startIndex": 0,
            "endIndex": 10
        }]
    })
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let base = start_server().await;
    let resp: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["status"], "ok");
    assert_eq!(resp["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_embeddings_route() {
    let base = start_server().await;

    let (status, body) = post(&base, "/api/embeddings", json!({ "text": "hello world" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["dimension"], 1024);
    assert_eq!(body["embedding"].as_array().unwrap().len(), 1024);
    assert_eq!(body["source"]["kind"], "fallback");

    for bad in [json!({}), json!({ "text": 42 }), json!({ "text": "" })] {
        let (status, body) = post(&base, "/api/embeddings", bad).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "bad_request");
        assert!(body["message"].is_string());
    }
}

#[tokio::test]
async fn test_invalid_json_is_bad_request() {
    let base = start_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/rag/search", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_rag_search_over_request_corpus() {
    let base = start_server().await;

    let mut request = migration_corpus();
    request["query"] = json!("候鸟为什么南飞");
    let (status, ctx) = post(&base, "/api/rag/search", request).await;
    assert_eq!(status, 200);
    // Chunks carry no embeddings, so retrieval falls back to keywords.
    assert_eq!(ctx["strategy"], "keyword");
    assert_eq!(ctx["totalResults"], 1);
    let relevance = ctx["results"][0]["relevance"].as_str().unwrap();
    assert!(relevance == "high" || relevance == "medium", "got {}", relevance);
    assert_eq!(ctx["results"][0]["document"]["title"], "迁徙指南");
}

#[tokio::test]
async fn test_rag_search_empty_corpus() {
    let base = start_server().await;

    for request in [
        json!({ "query": "anything" }),
        json!({ "query": "anything", "documents": [], "chunks": [] }),
    ] {
        let (status, ctx) = post(&base, "/api/rag/search", request).await;
        assert_eq!(status, 200);
        assert_eq!(ctx["totalResults"], 0);
        assert_eq!(ctx["results"], json!([]));
        assert_eq!(ctx["strategy"], "empty_corpus");
    }
}

#[tokio::test]
async fn test_rag_search_rejects_bad_input() {
    let base = start_server().await;

    let cases = [
        json!({ "documents": [], "chunks": [] }),
        json!({ "query": 7 }),
        json!({ "query": "x", "documents": "not a list" }),
        json!({ "query": "x", "chunks": [{ "id": "c1" }] }),
        json!({ "query": "x", "topK": 0 }),
    ];
    for request in cases {
        let (status, body) = post(&base, "/api/rag/search", request.clone()).await;
        assert_eq!(status, 400, "request {} should be rejected", request);
        assert_eq!(body["error"], "bad_request");
    }
}

#[tokio::test]
async fn test_documents_lifecycle() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let (status, added) = post(
        &base,
        "/api/documents",
        json!({ "filename": "迁徙指南.txt", "content": "候鸟每年秋季南飞越冬" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(added["success"], true);
    assert_eq!(added["document"]["title"], "迁徙指南");
    assert_eq!(added["report"]["chunkCount"], 1);
    let id = added["document"]["id"].as_str().unwrap().to_string();

    let encoded = base64::engine::general_purpose::STANDARD.encode("# Notes\n\nShip it on Friday.");
    let (status, added) = post(
        &base,
        "/api/documents",
        json!({ "filename": "notes.md", "contentBase64": encoded }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(added["document"]["fileType"], "md");

    let list: Value = client
        .get(format!("{}/api/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["count"], 2);

    let (status, ctx) = post(&base, "/api/rag/query", json!({ "query": "候鸟南飞", "topK": 1 })).await;
    assert_eq!(status, 200);
    assert_eq!(ctx["strategy"], "vector");
    assert_eq!(ctx["totalResults"], 1);

    let (status, body) = post(&base, "/api/rag/context", json!({ "query": "候鸟南飞" })).await;
    assert_eq!(status, 200);
    let context = body["context"].as_str().unwrap();
    assert!(context.starts_with("基于以下相关文档信息回答用户问题："));

    let resp: Value = client
        .delete(format!("{}/api/documents/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["success"], true);
    assert_eq!(resp["deleted"], true);

    let list: Value = client
        .get(format!("{}/api/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["count"], 1);
}

#[tokio::test]
async fn test_add_document_rejects_bad_uploads() {
    let base = start_server().await;

    let cases = [
        json!({ "filename": "scan.pdf", "content": "%PDF-1.4" }),
        json!({ "filename": "a.txt" }),
        json!({ "filename": "a.txt", "contentBase64": "@@not base64@@" }),
        json!({ "content": "orphan" }),
    ];
    for request in cases {
        let (status, body) = post(&base, "/api/documents", request.clone()).await;
        assert_eq!(status, 400, "request {} should be rejected", request);
        assert_eq!(body["error"], "bad_request");
    }
}

#[tokio::test]
async fn test_add_document_store_failure_is_internal_error() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = tmp.path().join("data");
    let store = JsonFileStore::open(&dir.join("docrag.json")).await.unwrap();
    // Every later write fails: the store's directory is now a regular file.
    std::fs::write(&dir, "not a directory").unwrap();
    let base = start_server_with(Arc::new(store)).await;

    let (status, body) = post(
        &base,
        "/api/documents",
        json!({ "filename": "notes.txt", "content": "Rust ownership rules" }),
    )
    .await;
    assert_eq!(status, 500);
    assert_eq!(body["error"], "internal");
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));

    let list: Value = reqwest::get(format!("{}/api/documents", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["count"], 0);
}
