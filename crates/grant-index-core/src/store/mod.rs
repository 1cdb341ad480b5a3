//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the raw, per-call contract of the external
//! vector database. It knows nothing about batching limits or dimension
//! conventions; [`VectorStoreClient`](crate::client::VectorStoreClient)
//! layers those on top.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](VectorStore::upsert) | Insert or overwrite records by id |
//! | [`query`](VectorStore::query) | Similarity query with a metadata filter |
//! | [`delete_many`](VectorStore::delete_many) | Delete records by id |
//!
//! Implementations must be `Send + Sync` to be shared across requests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::filter::MetadataFilter;
use crate::models::{VectorMatch, VectorRecord};

/// Inputs for a single query call.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Similarity vector. Always present: the store requires one.
    pub vector: Vec<f32>,
    pub filter: MetadataFilter,
    pub top_k: usize,
    pub include_metadata: bool,
}

/// Raw operations of an external vector database.
///
/// One trait call maps to one upstream request; callers are responsible
/// for keeping `records`/`ids` within the store's batch ceiling.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite `records`. Returns the number written.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize>;

    /// Return up to `top_k` matches for the request, best first.
    async fn query(&self, request: &QueryRequest) -> Result<Vec<VectorMatch>>;

    /// Delete the given ids. Unknown ids are ignored.
    async fn delete_many(&self, ids: &[String]) -> Result<()>;
}
