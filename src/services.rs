//! Wiring of the core services from configuration.
//!
//! [`Services`] is the single entry point shared by the CLI and the HTTP
//! server. It owns the ingestion pipeline (absent when embeddings are
//! disabled), the retrieval service, and the attachment store used by
//! reconciliation.

use anyhow::Result;
use std::sync::Arc;
use thiserror::Error;

use grant_index_core::chunk::Chunker;
use grant_index_core::client::VectorStoreClient;
use grant_index_core::embedding::{Embedder, DEFAULT_DIMS};
use grant_index_core::ingest::{IngestPipeline, IngestReport, IngestRequest};
use grant_index_core::models::{DocumentIndexEntry, VectorMatch};
use grant_index_core::reconcile::{reconcile, AttachmentStore, ReconcileOutcome};
use grant_index_core::retrieval::{DeleteReport, RetrievalService};
use grant_index_core::store::memory::InMemoryVectorStore;
use grant_index_core::store::VectorStore;
use grant_index_core::IndexError;

use crate::attachments::SqliteAttachmentStore;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::extract::{content_type_essence, extract_document, ExtractError};
use crate::pinecone::PineconeStore;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("embeddings are disabled; configure [embedding] to ingest documents")]
    EmbeddingsDisabled,
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// A document upload that still needs text extraction.
pub struct Upload<'a> {
    pub user_id: &'a str,
    pub document_id: &'a str,
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

pub struct Services {
    ingest: Option<IngestPipeline>,
    retrieval: RetrievalService,
    attachments: Arc<dyn AttachmentStore>,
}

impl Services {
    /// Assemble services from explicit backends.
    ///
    /// An embedder reporting zero dimensions (the disabled provider) leaves
    /// ingestion unavailable; listing and deletion still work.
    pub fn new(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        attachments: Arc<dyn AttachmentStore>,
    ) -> Result<Self> {
        let dims = match embedder.dims() {
            0 => config.embedding.dims.unwrap_or(DEFAULT_DIMS),
            n => n,
        };
        let client = Arc::new(
            VectorStoreClient::new(store, dims).with_batch_size(config.vector_store.batch_size),
        );

        let ingest = if embedder.dims() > 0 {
            let chunker = Chunker::new(config.chunking.max_chars, config.chunking.min_chars)?;
            Some(
                IngestPipeline::new(embedder, client.clone())?
                    .with_chunker(chunker)
                    .with_concurrency(config.embedding.concurrency)
                    .with_scan_ceiling(config.retrieval.scan_ceiling),
            )
        } else {
            None
        };

        let retrieval = RetrievalService::new(client)
            .with_max_documents(config.retrieval.max_documents)
            .with_scan_ceiling(config.retrieval.scan_ceiling);

        Ok(Self {
            ingest,
            retrieval,
            attachments,
        })
    }

    /// Build every backend named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let store: Arc<dyn VectorStore> = match config.vector_store.provider.as_str() {
            "pinecone" => Arc::new(PineconeStore::new(&config.vector_store)?),
            "memory" => {
                tracing::warn!("using the in-memory vector store; nothing outlives this process");
                Arc::new(InMemoryVectorStore::new())
            }
            other => anyhow::bail!("Unknown vector store provider: {}", other),
        };
        let pool = db::connect(config).await?;
        let attachments = Arc::new(SqliteAttachmentStore::new(pool));
        Self::new(config, embedder, store, attachments)
    }

    pub fn embeddings_enabled(&self) -> bool {
        self.ingest.is_some()
    }

    pub async fn ingest(&self, request: &IngestRequest) -> Result<IngestReport, ServiceError> {
        let pipeline = self
            .ingest
            .as_ref()
            .ok_or(ServiceError::EmbeddingsDisabled)?;
        Ok(pipeline.ingest(request).await?)
    }

    /// Extract text from an upload, then ingest it.
    pub async fn ingest_upload(&self, upload: Upload<'_>) -> Result<IngestReport, ServiceError> {
        if self.ingest.is_none() {
            return Err(ServiceError::EmbeddingsDisabled);
        }
        let extracted = extract_document(upload.bytes, upload.content_type)?;
        let request = IngestRequest {
            user_id: upload.user_id.to_string(),
            document_id: upload.document_id.to_string(),
            file_name: upload.file_name.to_string(),
            file_type: content_type_essence(upload.content_type),
            text: extracted.text,
            pages: extracted.pages,
        };
        self.ingest(&request).await
    }

    pub async fn list_documents(&self, user_id: &str) -> Result<Vec<DocumentIndexEntry>, ServiceError> {
        Ok(self.retrieval.list_documents(user_id).await?)
    }

    pub async fn list_vectors(&self, user_id: &str, document_id: &str) -> Result<Vec<VectorMatch>, ServiceError> {
        Ok(self
            .retrieval
            .list_vectors_for_document(user_id, document_id)
            .await?)
    }

    pub async fn delete_document(&self, user_id: &str, document_id: &str) -> Result<DeleteReport, ServiceError> {
        Ok(self.retrieval.delete_document(user_id, document_id).await?)
    }

    pub async fn delete_by_file_name(&self, user_id: &str, file_name: &str) -> Result<DeleteReport, ServiceError> {
        Ok(self.retrieval.delete_by_file_name(user_id, file_name).await?)
    }

    pub async fn reconcile(&self, project_id: &str) -> Result<ReconcileOutcome, ServiceError> {
        Ok(reconcile(self.attachments.as_ref(), project_id).await?)
    }
}
