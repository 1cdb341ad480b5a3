//! Pinecone-compatible HTTP [`VectorStore`].
//!
//! | Operation | Request |
//! |-----------|---------|
//! | upsert | `POST {host}/vectors/upsert` `{vectors, namespace?}` |
//! | query | `POST {host}/query` `{vector, topK, filter, includeMetadata, includeValues, namespace?}` |
//! | delete | `POST {host}/vectors/delete` `{ids, namespace?}` |
//!
//! Requests authenticate with the `Api-Key` header and go through the
//! shared retry policy. Batching is the caller's concern
//! ([`VectorStoreClient`](grant_index_core::client::VectorStoreClient)).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use grant_index_core::models::{RecordMetadata, VectorMatch, VectorRecord};
use grant_index_core::store::{QueryRequest, VectorStore};

use crate::config::VectorStoreConfig;
use crate::retry::{send_with_retry, RetryPolicy};

pub struct PineconeStore {
    host: String,
    namespace: Option<String>,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct WireVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a RecordMetadata,
}

#[derive(Serialize)]
struct UpsertBody<'a> {
    vectors: Vec<WireVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    vector: &'a [f32],
    top_k: usize,
    filter: Value,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Serialize)]
struct DeleteBody<'a> {
    ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

impl PineconeStore {
    /// # Errors
    ///
    /// Fails when `host` is unset or the API key variable is missing.
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let host = config
            .host
            .clone()
            .ok_or_else(|| anyhow::anyhow!("vector_store.host required for Pinecone provider"))?;
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone().filter(|ns| !ns.is_empty()),
            api_key,
            client,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.host, path);
        send_with_retry("Pinecone API", self.retry, || {
            self.client
                .post(&url)
                .header("Api-Key", &self.api_key)
                .json(body)
        })
        .await
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        let body = UpsertBody {
            vectors: records
                .iter()
                .map(|r| WireVector {
                    id: &r.id,
                    values: &r.embedding,
                    metadata: &r.metadata,
                })
                .collect(),
            namespace: self.namespace.as_deref(),
        };
        let response: UpsertResponse = self
            .post("/vectors/upsert", &body)
            .await?
            .json()
            .await
            .context("Invalid Pinecone upsert response")?;
        Ok(response.upserted_count.unwrap_or(records.len()))
    }

    async fn query(&self, request: &QueryRequest) -> Result<Vec<VectorMatch>> {
        let body = QueryBody {
            vector: &request.vector,
            top_k: request.top_k,
            filter: request.filter.to_json(),
            include_metadata: request.include_metadata,
            include_values: false,
            namespace: self.namespace.as_deref(),
        };
        let response: QueryResponse = self
            .post("/query", &body)
            .await?
            .json()
            .await
            .context("Invalid Pinecone query response")?;

        response
            .matches
            .into_iter()
            .map(|m| {
                let metadata = m
                    .metadata
                    .map(|raw| {
                        serde_json::from_value::<RecordMetadata>(integral_floats_to_ints(raw))
                            .with_context(|| format!("Invalid metadata on record {}", m.id))
                    })
                    .transpose()?;
                Ok(VectorMatch {
                    id: m.id,
                    score: m.score,
                    metadata,
                })
            })
            .collect()
    }

    async fn delete_many(&self, ids: &[String]) -> Result<()> {
        let body = DeleteBody {
            ids,
            namespace: self.namespace.as_deref(),
        };
        self.post("/vectors/delete", &body).await?;
        Ok(())
    }
}

/// Pinecone stores every metadata number as a float (`3` comes back as
/// `3.0`); turn integral floats back into integers so counters and
/// offsets deserialize.
fn integral_floats_to_ints(value: Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= 0.0 && f <= u64::MAX as f64 => {
                Value::from(f as u64)
            }
            Some(f) if f.fract() == 0.0 && f < 0.0 && f >= i64::MIN as f64 => {
                Value::from(f as i64)
            }
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(integral_floats_to_ints).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, integral_floats_to_ints(v)))
                .collect(),
        ),
        other => other,
    }
}
