//! # Grant Index Core
//!
//! Runtime-agnostic logic for the document vectorization index: data
//! models, chunking, the metadata filter builder, the embedder and vector
//! store traits, the batching store client, and the ingestion, retrieval,
//! and reconciliation services built on top of them.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! Concrete backends (OpenAI embeddings, a Pinecone-compatible store,
//! SQLite attachments) live in the `grant-index` application crate.
//!
//! ## Write path
//!
//! ```text
//! text ──▶ Chunker ──▶ Embedder ──▶ IngestPipeline ──▶ VectorStoreClient
//! ```
//!
//! ## Read / delete path
//!
//! ```text
//! (user, document) ──▶ MetadataFilter ──▶ VectorStoreClient ──▶ RetrievalService
//! ```

pub mod chunk;
pub mod client;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod models;
pub mod reconcile;
pub mod retrieval;
pub mod store;

pub use error::{IndexError, IndexResult, VectorStoreError};
