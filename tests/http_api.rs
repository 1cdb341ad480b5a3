//! HTTP API tests against a router backed by the in-memory vector store.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use grant_index::config::{parse_config, Config};
use grant_index::server::build_router;
use grant_index::services::Services;
use grant_index_core::embedding::Embedder;
use grant_index_core::models::{AttachmentMap, AttachmentRecord};
use grant_index_core::reconcile::InMemoryAttachmentStore;
use grant_index_core::store::memory::InMemoryVectorStore;

const DIMS: usize = 8;

/// Deterministic embedder: a vector derived from the text's bytes.
struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; DIMS];
        for (i, b) in text.bytes().enumerate() {
            v[i % DIMS] += b as f32 / 255.0;
        }
        v[0] += 1.0;
        Ok(v)
    }
}

/// Reports zero dimensions, like the disabled provider.
struct NoEmbedder;

#[async_trait]
impl Embedder for NoEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("disabled")
    }
}

fn test_config() -> Config {
    parse_config(
        r#"
[db]
path = "unused.sqlite"

[chunking]
max_chars = 30
min_chars = 10

[embedding]
dims = 8

[vector_store]
provider = "memory"

[server]
bind = "127.0.0.1:0"
"#,
    )
    .unwrap()
}

struct TestServer {
    base: String,
    http: reqwest::Client,
    attachments: Arc<InMemoryAttachmentStore>,
}

async fn spawn(embedder: Arc<dyn Embedder>) -> TestServer {
    let config = test_config();
    let attachments = Arc::new(InMemoryAttachmentStore::new());
    let services = Services::new(
        &config,
        embedder,
        Arc::new(InMemoryVectorStore::new()),
        attachments.clone(),
    )
    .unwrap();
    let app = build_router(Arc::new(services));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        http: reqwest::Client::new(),
        attachments,
    }
}

const THREE_PARAGRAPHS: &str =
    "First paragraph here.\n\nSecond one follows.\n\nThird part ends it.";

async fn ingest(server: &TestServer, user: &str, doc: &str, file_name: &str) -> Value {
    let resp = server
        .http
        .post(format!("{}/documents", server.base))
        .json(&json!({
            "userId": user,
            "documentId": doc,
            "fileName": file_name,
            "fileType": "text/plain",
            "text": THREE_PARAGRAPHS,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    resp.json().await.unwrap()
}

async fn list(server: &TestServer, user: &str) -> Vec<Value> {
    let body: Value = server
        .http
        .get(format!("{}/users/{}/documents", server.base, user))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["documents"].as_array().unwrap().clone()
}

#[tokio::test]
async fn test_health() {
    let server = spawn(Arc::new(HashEmbedder)).await;
    let body: Value = server
        .http
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["embeddings"], true);
}

#[tokio::test]
async fn test_ingest_list_vectors_delete_by_file_name() {
    let server = spawn(Arc::new(HashEmbedder)).await;

    let report = ingest(&server, "u1", "d1", "narrative.txt").await;
    assert_eq!(report["documentId"], "d1");
    assert_eq!(report["totalChunks"], 3);

    let docs = list(&server, "u1").await;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["id"], "d1");
    assert_eq!(docs[0]["fileName"], "narrative.txt");
    assert_eq!(docs[0]["chunks"], 3);
    assert!(list(&server, "u2").await.is_empty());

    let body: Value = server
        .http
        .get(format!("{}/users/u1/documents/d1/vectors", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let vectors = body["vectors"].as_array().unwrap();
    assert_eq!(vectors.len(), 4);
    assert_eq!(vectors[0]["metadata"]["isMetadata"], true);
    assert_eq!(vectors[1]["metadata"]["text"], "First paragraph here.");

    let resp = server
        .http
        .delete(format!("{}/users/u1/files/narrative.txt", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], 4);
    assert_eq!(body["documentIds"], json!(["d1"]));

    assert!(list(&server, "u1").await.is_empty());
}

#[tokio::test]
async fn test_delete_document_then_not_found() {
    let server = spawn(Arc::new(HashEmbedder)).await;
    ingest(&server, "u1", "d1", "a.txt").await;
    ingest(&server, "u1", "d2", "b.txt").await;

    let url = format!("{}/users/u1/documents/d1", server.base);
    let resp = server.http.delete(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], 4);

    let docs = list(&server, "u1").await;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["id"], "d2");

    let resp = server.http.delete(&url).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let server = spawn(Arc::new(HashEmbedder)).await;
    ingest(&server, "u1", "d1", "a.txt").await;
    let report = ingest(&server, "u1", "d1", "a.txt").await;
    assert_eq!(report["stalePruned"], 0);

    let docs = list(&server, "u1").await;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["chunks"], 3);
}

#[tokio::test]
async fn test_upload_plain_text() {
    let server = spawn(Arc::new(HashEmbedder)).await;
    let resp = server
        .http
        .put(format!(
            "{}/users/u1/documents/d7/content?fileName=notes.txt",
            server.base
        ))
        .header("content-type", "text/plain; charset=utf-8")
        .body(THREE_PARAGRAPHS)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["totalChunks"], 3);
    let docs = list(&server, "u1").await;
    assert_eq!(docs[0]["fileName"], "notes.txt");
    assert_eq!(docs[0]["fileType"], "text/plain");
}

#[tokio::test]
async fn test_upload_without_file_name_is_bad_request() {
    let server = spawn(Arc::new(HashEmbedder)).await;
    let resp = server
        .http
        .put(format!("{}/users/u1/documents/d7/content", server.base))
        .header("content-type", "text/plain")
        .body(THREE_PARAGRAPHS)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_malformed_ingest_body_uses_error_envelope() {
    let server = spawn(Arc::new(HashEmbedder)).await;
    let url = format!("{}/documents", server.base);

    let resp = server.http.post(&url).json(&json!({})).send().await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(!body["error"]["message"].as_str().unwrap().is_empty());

    let resp = server
        .http
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_upload_unsupported_media_type() {
    let server = spawn(Arc::new(HashEmbedder)).await;
    let resp = server
        .http
        .put(format!(
            "{}/users/u1/documents/d7/content?fileName=x.bin",
            server.base
        ))
        .header("content-type", "application/octet-stream")
        .body(vec![0u8, 1, 2])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 415);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unsupported_media_type");
}

#[tokio::test]
async fn test_validation_errors_are_bad_request() {
    let server = spawn(Arc::new(HashEmbedder)).await;
    let resp = server
        .http
        .post(format!("{}/documents", server.base))
        .json(&json!({
            "userId": "u1",
            "documentId": "d1",
            "fileName": "empty.txt",
            "fileType": "text/plain",
            "text": "   ",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn test_embeddings_disabled() {
    let server = spawn(Arc::new(NoEmbedder)).await;
    let resp = server
        .http
        .post(format!("{}/documents", server.base))
        .json(&json!({
            "userId": "u1",
            "fileName": "a.txt",
            "fileType": "text/plain",
            "text": THREE_PARAGRAPHS,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "embeddings_disabled");

    // Listing still works without an embedder.
    assert!(list(&server, "u1").await.is_empty());
}

#[tokio::test]
async fn test_reconcile_route() {
    let server = spawn(Arc::new(HashEmbedder)).await;
    let mut map = AttachmentMap::new();
    map.insert("budget".into(), AttachmentRecord::new("d1"));
    map.insert("letter".into(), AttachmentRecord::new("d2"));
    server.attachments.insert_project("p1", map);
    server.attachments.mark_completed("p1", "d1");

    let url = format!("{}/projects/p1/reconcile", server.base);
    let body: Value = server
        .http
        .post(&url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["state"], "drifted");
    assert_eq!(body["repaired"], json!(["budget"]));
    assert_eq!(body["needsRefresh"], true);
    assert!(server.attachments.attachments("p1").unwrap()["budget"].completed);

    let body: Value = server
        .http
        .post(&url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["state"], "clean");
    assert_eq!(body["needsRefresh"], false);

    let resp = server
        .http
        .post(format!("{}/projects/ghost/reconcile", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
