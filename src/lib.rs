//! # Grant Index
//!
//! Document vectorization and retrieval index for grant-management
//! attachments. Extracted document text is chunked, embedded and stored in
//! a Pinecone-compatible vector store under a per-user metadata schema;
//! documents can then be listed, inspected and deleted per user. A
//! reconciliation job keeps the relational attachment completion flags in
//! line with completed-document rows.
//!
//! The algorithms live in [`grant_index_core`]; this crate supplies the
//! concrete backends, configuration, the HTTP API and the `gidx` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │  Extract   │──▶│ Chunk + Embed    │──▶│ Vector store │
//! │ PDF / DOCX │   │ (OpenAI, Ollama) │   │  (Pinecone)  │
//! └────────────┘   └──────────────────┘   └──────┬───────┘
//!                                                │
//!                      ┌─────────────────────────┤
//!                      ▼                         ▼
//!                 ┌──────────┐             ┌──────────┐      ┌────────┐
//!                 │   CLI    │             │   HTTP   │─────▶│ SQLite │
//!                 │  (gidx)  │             │  (axum)  │      │ attach │
//!                 └──────────┘             └──────────┘      └────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gidx init                                   # create the attachments database
//! gidx ingest proposal.pdf --user u1          # extract, chunk, embed, upsert
//! gidx documents --user u1                    # list indexed documents
//! gidx delete --user u1 --file-name proposal.pdf
//! gidx serve                                  # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | OpenAI / Ollama embedders |
//! | [`pinecone`] | Pinecone-compatible vector store |
//! | [`retry`] | HTTP retry with backoff |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`attachments`] | SQLite attachment store |
//! | [`commands`] | `gidx` subcommand implementations |
//! | [`services`] | Service wiring shared by CLI and server |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod attachments;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod migrate;
pub mod pinecone;
pub mod retry;
pub mod server;
pub mod services;

pub use grant_index_core;
