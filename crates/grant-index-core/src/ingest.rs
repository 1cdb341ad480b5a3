//! Ingestion pipeline: chunk → embed → tag → batch-upsert.
//!
//! Each document becomes N content records (`{user}:{doc}:{i}`) plus one
//! metadata record (`{user}:{doc}:meta`) carrying `totalChunks`.
//!
//! # Write order
//!
//! 1. Content records are upserted.
//! 2. Content records left over from a previous, longer version of the
//!    document (`chunkIndex >= totalChunks`) are pruned.
//! 3. The metadata record is upserted last.
//!
//! Ingestion is not atomic. A reader treats the presence of the metadata
//! record as "this document is indexed"; stray content records without it
//! mean "not yet indexed". Every write is keyed by a deterministic id, so
//! re-running an interrupted or failed ingestion overwrites in place.
//!
//! Concurrent ingestions of the same document through one pipeline are
//! serialized around the write phase, so the last caller to acquire the
//! document wins and the metadata record always matches the content
//! records on disk. Embedding still runs in parallel.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::lock::Mutex as AsyncMutex;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::chunk::Chunker;
use crate::client::VectorStoreClient;
use crate::embedding::{check_dims, Embedder};
use crate::error::{IndexError, IndexResult};
use crate::filter::MetadataFilter;
use crate::models::{
    record_id, validate_id_part, ChunkDescriptor, PageOffset, RecordMetadata, RecordSlot,
    RecordType, VectorRecord,
};
use crate::retrieval::DEFAULT_SCAN_CEILING;

/// Simultaneous embedding calls per document unless configured otherwise.
pub const DEFAULT_EMBED_CONCURRENCY: usize = 4;

/// Upper limit on simultaneous embedding calls per document.
pub const MAX_EMBED_CONCURRENCY: usize = 8;

/// Characters of leading document text embedded into the metadata record.
pub const METADATA_SUMMARY_CHARS: usize = 1000;

/// A document ready to be indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub user_id: String,
    pub document_id: String,
    pub file_name: String,
    pub file_type: String,
    pub text: String,
    #[serde(default)]
    pub pages: Vec<PageOffset>,
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub document_id: String,
    pub total_chunks: usize,
    /// Content records plus the metadata record.
    pub records_written: usize,
    /// Stale content records removed from an earlier, longer version.
    pub stale_pruned: usize,
}

/// Per-document write locks, keyed by the metadata record id.
///
/// Entries are dropped once no caller holds or awaits them.
#[derive(Default)]
struct DocumentLocks {
    held: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DocumentLocks {
    async fn run<T>(&self, key: String, work: impl Future<Output = T>) -> T {
        let lock = self
            .held
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let out = {
            let _guard = lock.lock().await;
            work.await
        };
        let mut held = self.held.lock().unwrap();
        // One reference in the map plus ours: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            held.remove(&key);
        }
        out
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.held.lock().unwrap().len()
    }
}

pub struct IngestPipeline {
    embedder: Arc<dyn Embedder>,
    client: Arc<VectorStoreClient>,
    chunker: Chunker,
    concurrency: usize,
    scan_ceiling: usize,
    locks: DocumentLocks,
}

impl IngestPipeline {
    /// # Errors
    ///
    /// [`IndexError::DimensionMismatch`] when the embedder and the store
    /// client disagree on dimensionality.
    pub fn new(embedder: Arc<dyn Embedder>, client: Arc<VectorStoreClient>) -> IndexResult<Self> {
        if embedder.dims() != client.dims() {
            return Err(IndexError::DimensionMismatch {
                expected: client.dims(),
                actual: embedder.dims(),
            });
        }
        Ok(Self {
            embedder,
            client,
            chunker: Chunker::default(),
            concurrency: DEFAULT_EMBED_CONCURRENCY,
            scan_ceiling: DEFAULT_SCAN_CEILING,
            locks: DocumentLocks::default(),
        })
    }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    /// Clamped to `1..=MAX_EMBED_CONCURRENCY`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_EMBED_CONCURRENCY);
        self
    }

    pub fn with_scan_ceiling(mut self, scan_ceiling: usize) -> Self {
        self.scan_ceiling = scan_ceiling.max(2);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Index one document.
    ///
    /// # Errors
    ///
    /// - [`IndexError::Validation`] for empty identifiers, identifiers
    ///   containing `:`, empty text, or a document too large for the scan
    ///   ceiling.
    /// - [`IndexError::Embedding`] naming the first chunk whose embedding
    ///   failed; nothing is written in that case.
    /// - [`IndexError::DimensionMismatch`] if the provider returns a vector
    ///   of the wrong length.
    /// - [`IndexError::VectorStore`] if any upsert or prune batch failed.
    pub async fn ingest(&self, req: &IngestRequest) -> IndexResult<IngestReport> {
        validate_id_part("userId", &req.user_id)?;
        validate_id_part("documentId", &req.document_id)?;
        if req.file_name.trim().is_empty() {
            return Err(IndexError::Validation("fileName must not be empty".to_string()));
        }

        let chunks: Vec<ChunkDescriptor> = self.chunker.chunks(&req.text, &req.pages)?.collect();
        let total_chunks = chunks.len();
        // Content records plus the metadata record must stay below the
        // ceiling, or deletion could no longer see all of them.
        if total_chunks + 1 >= self.scan_ceiling {
            return Err(IndexError::Validation(format!(
                "document produces {} chunks; at most {} are supported",
                total_chunks,
                self.scan_ceiling - 2
            )));
        }

        tracing::debug!(
            user_id = %req.user_id,
            document_id = %req.document_id,
            total_chunks,
            concurrency = self.concurrency,
            "embedding document"
        );

        let pending: Vec<_> = chunks
            .iter()
            .map(|c| self.embed_checked(Some(c.chunk_index), &c.text))
            .collect();
        let embeddings: Vec<Vec<f32>> = stream::iter(pending)
            .buffered(self.concurrency)
            .try_collect()
            .await?;
        let summary = self
            .embed_checked(None, &metadata_summary(&req.file_name, &req.text))
            .await?;

        let content: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| content_record(req, chunk, embedding))
            .collect();

        let key = record_id(&req.user_id, &req.document_id, RecordSlot::Metadata);
        let (records_written, stale_pruned) = self
            .locks
            .run(key, self.write_records(req, &content, total_chunks, summary))
            .await?;

        tracing::info!(
            user_id = %req.user_id,
            document_id = %req.document_id,
            total_chunks,
            stale_pruned,
            "document indexed"
        );

        Ok(IngestReport {
            document_id: req.document_id.clone(),
            total_chunks,
            records_written,
            stale_pruned,
        })
    }

    /// Content, then pruning, then the metadata record. Callers hold the
    /// document's lock.
    async fn write_records(
        &self,
        req: &IngestRequest,
        content: &[VectorRecord],
        total_chunks: usize,
        summary: Vec<f32>,
    ) -> IndexResult<(usize, usize)> {
        let mut written = self.client.upsert(content).await?;
        let pruned = self.prune_stale(req, total_chunks).await?;
        written += self
            .client
            .upsert(&[metadata_record(req, total_chunks, summary)])
            .await?;
        Ok((written, pruned))
    }

    async fn embed_checked(&self, chunk_index: Option<usize>, text: &str) -> IndexResult<Vec<f32>> {
        let vector = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| IndexError::Embedding {
                chunk_index,
                message: format!("{:#}", e),
            })?;
        check_dims(self.embedder.dims(), &vector)?;
        Ok(vector)
    }

    /// Delete content records at or beyond `total_chunks`.
    async fn prune_stale(&self, req: &IngestRequest, total_chunks: usize) -> IndexResult<usize> {
        let mut pruned = 0;
        loop {
            let filter = MetadataFilter::for_user(&req.user_id)
                .document(&req.document_id)
                .metadata_records(false)
                .chunk_index_at_least(total_chunks);
            let stale = self
                .client
                .query_by_filter(filter, self.scan_ceiling, false)
                .await?;
            if stale.is_empty() {
                break;
            }
            let ids: Vec<String> = stale.iter().map(|m| m.id.clone()).collect();
            pruned += self.client.delete_many(&ids).await?;
            if stale.len() < self.scan_ceiling {
                break;
            }
        }
        if pruned > 0 {
            tracing::info!(
                document_id = %req.document_id,
                pruned,
                "pruned stale content records"
            );
        }
        Ok(pruned)
    }
}

fn base_metadata(req: &IngestRequest, is_metadata: bool) -> RecordMetadata {
    RecordMetadata {
        user_id: req.user_id.clone(),
        document_id: req.document_id.clone(),
        file_name: req.file_name.clone(),
        file_type: req.file_type.clone(),
        record_type: RecordType::VectorizedDocument,
        is_metadata,
        total_chunks: None,
        created_at: None,
        text: None,
        chunk_index: None,
        page_number: None,
        start_offset: None,
        end_offset: None,
    }
}

fn content_record(req: &IngestRequest, chunk: ChunkDescriptor, embedding: Vec<f32>) -> VectorRecord {
    let mut metadata = base_metadata(req, false);
    metadata.chunk_index = Some(chunk.chunk_index);
    metadata.page_number = chunk.page_number;
    metadata.start_offset = chunk.start_offset;
    metadata.end_offset = chunk.end_offset;
    metadata.text = Some(chunk.text);
    VectorRecord {
        id: record_id(
            &req.user_id,
            &req.document_id,
            RecordSlot::Chunk(chunk.chunk_index),
        ),
        embedding,
        metadata,
    }
}

fn metadata_record(req: &IngestRequest, total_chunks: usize, embedding: Vec<f32>) -> VectorRecord {
    let mut metadata = base_metadata(req, true);
    metadata.total_chunks = Some(total_chunks);
    metadata.created_at = Some(Utc::now());
    VectorRecord {
        id: record_id(&req.user_id, &req.document_id, RecordSlot::Metadata),
        embedding,
        metadata,
    }
}

/// Text embedded for the metadata record: file name plus leading text.
fn metadata_summary(file_name: &str, text: &str) -> String {
    let lead: String = text.trim().chars().take(METADATA_SUMMARY_CHARS).collect();
    format!("{}\n\n{}", file_name, lead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VectorMatch;
    use crate::store::memory::InMemoryVectorStore;
    use crate::store::{QueryRequest, VectorStore};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DIMS: usize = 8;

    /// Deterministic embedder that can be told to fail on a given text.
    struct TestEmbedder {
        dims: usize,
        fail_on: Option<&'static str>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl TestEmbedder {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                fail_on: None,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for TestEmbedder {
        fn model_name(&self) -> &str {
            "test"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if let Some(bad) = self.fail_on {
                if text.contains(bad) {
                    bail!("provider rejected input");
                }
            }
            let mut v = vec![0.1; DIMS];
            v[0] = text.len() as f32;
            Ok(v)
        }
    }

    /// Returns vectors one element short.
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            DIMS
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0; DIMS - 1])
        }
    }

    fn three_paragraphs() -> String {
        ["Aims of the project.", "Methods we will use.", "Budget overview."].join("\n\n")
    }

    fn request(text: &str) -> IngestRequest {
        IngestRequest {
            user_id: "u1".into(),
            document_id: "doc1".into(),
            file_name: "proposal.pdf".into(),
            file_type: "application/pdf".into(),
            text: text.to_string(),
            pages: Vec::new(),
        }
    }

    fn pipeline(
        embedder: Arc<dyn Embedder>,
    ) -> (Arc<InMemoryVectorStore>, IngestPipeline) {
        let store = Arc::new(InMemoryVectorStore::recording());
        let client = Arc::new(VectorStoreClient::new(store.clone(), DIMS));
        let pipeline = IngestPipeline::new(embedder, client)
            .unwrap()
            .with_chunker(Chunker::new(25, 5).unwrap());
        (store, pipeline)
    }

    #[tokio::test]
    async fn test_ingest_writes_content_and_metadata() {
        let (store, pipeline) = pipeline(Arc::new(TestEmbedder::new(DIMS)));
        let report = pipeline.ingest(&request(&three_paragraphs())).await.unwrap();
        assert_eq!(report.total_chunks, 3);
        assert_eq!(report.records_written, 4);
        assert_eq!(
            store.ids(),
            vec!["u1:doc1:0", "u1:doc1:1", "u1:doc1:2", "u1:doc1:meta"]
        );
        let meta = store.get("u1:doc1:meta").unwrap().metadata;
        assert!(meta.is_metadata);
        assert_eq!(meta.total_chunks, Some(3));
        assert!(meta.text.is_none());
        assert!(meta.created_at.is_some());
        let first = store.get("u1:doc1:0").unwrap().metadata;
        assert_eq!(first.text.as_deref(), Some("Aims of the project."));
        assert_eq!(first.chunk_index, Some(0));
    }

    #[tokio::test]
    async fn test_ingest_twice_is_idempotent() {
        let (store, pipeline) = pipeline(Arc::new(TestEmbedder::new(DIMS)));
        let req = request(&three_paragraphs());
        pipeline.ingest(&req).await.unwrap();
        let first_ids = store.ids();
        let first_text = store.get("u1:doc1:1").unwrap().metadata.text;
        let report = pipeline.ingest(&req).await.unwrap();
        assert_eq!(store.ids(), first_ids);
        assert_eq!(store.get("u1:doc1:1").unwrap().metadata.text, first_text);
        assert_eq!(report.stale_pruned, 0);
    }

    #[tokio::test]
    async fn test_shrinking_reingest_prunes_stale_chunks() {
        let (store, pipeline) = pipeline(Arc::new(TestEmbedder::new(DIMS)));
        pipeline.ingest(&request(&three_paragraphs())).await.unwrap();
        let report = pipeline
            .ingest(&request("Only one short paragraph."))
            .await
            .unwrap();
        assert_eq!(report.total_chunks, 1);
        assert_eq!(report.stale_pruned, 2);
        assert_eq!(store.ids(), vec!["u1:doc1:0", "u1:doc1:meta"]);
        assert_eq!(
            store.get("u1:doc1:meta").unwrap().metadata.total_chunks,
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_with_chunk_index() {
        let mut embedder = TestEmbedder::new(DIMS);
        embedder.fail_on = Some("Methods");
        let (store, pipeline) = pipeline(Arc::new(embedder));
        let err = pipeline
            .ingest(&request(&three_paragraphs()))
            .await
            .unwrap_err();
        match err {
            IndexError::Embedding { chunk_index, .. } => assert_eq!(chunk_index, Some(1)),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(store.is_empty());
        assert!(store.upsert_calls().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_fatal() {
        let (store, pipeline) = pipeline(Arc::new(ShortEmbedder));
        let err = pipeline
            .ingest(&request(&three_paragraphs()))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
        assert!(!err.is_retryable());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_embedder_rejected_at_construction() {
        let store = Arc::new(InMemoryVectorStore::new());
        let client = Arc::new(VectorStoreClient::new(store, DIMS + 1));
        let result = IngestPipeline::new(Arc::new(TestEmbedder::new(DIMS)), client);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (_store, pipeline) = pipeline(Arc::new(TestEmbedder::new(DIMS)));
        let mut req = request("   ");
        assert!(matches!(
            pipeline.ingest(&req).await,
            Err(IndexError::Validation(_))
        ));
        req.text = "Some text.".into();
        req.document_id = "a:b".into();
        assert!(matches!(
            pipeline.ingest(&req).await,
            Err(IndexError::Validation(_))
        ));
        req.document_id = "doc".into();
        req.file_name = String::new();
        assert!(matches!(
            pipeline.ingest(&req).await,
            Err(IndexError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_document_too_large_for_ceiling() {
        let (store, pipeline) = pipeline(Arc::new(TestEmbedder::new(DIMS)));
        let pipeline = pipeline.with_scan_ceiling(4);
        let text = (0..10)
            .map(|i| format!("Paragraph {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let err = pipeline.ingest(&request(&text)).await.unwrap_err();
        assert!(matches!(err, IndexError::Validation(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_concurrency_is_bounded() {
        let embedder = Arc::new(TestEmbedder::new(DIMS));
        let (_store, pipeline) = pipeline(embedder.clone());
        let pipeline = pipeline.with_concurrency(2);
        let text = (0..20)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        pipeline.ingest(&request(&text)).await.unwrap();
        assert!(embedder.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pipeline.with_concurrency(64).concurrency(), MAX_EMBED_CONCURRENCY);
    }

    /// Holds the first metadata upsert claiming `hold_total` chunks until
    /// `release` fires.
    struct GatedStore {
        inner: Arc<InMemoryVectorStore>,
        hold_total: usize,
        gate: std::sync::Mutex<Option<futures::channel::oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl VectorStore for GatedStore {
        async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
            let held = records
                .iter()
                .any(|r| r.metadata.is_metadata && r.metadata.total_chunks == Some(self.hold_total));
            if held {
                let gate = self.gate.lock().unwrap().take();
                if let Some(rx) = gate {
                    let _ = rx.await;
                }
            }
            self.inner.upsert(records).await
        }

        async fn query(&self, request: &QueryRequest) -> Result<Vec<VectorMatch>> {
            self.inner.query(request).await
        }

        async fn delete_many(&self, ids: &[String]) -> Result<()> {
            self.inner.delete_many(ids).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_ingest_of_same_document_stays_consistent() {
        let inner = Arc::new(InMemoryVectorStore::new());
        let (release, rx) = futures::channel::oneshot::channel();
        let store = Arc::new(GatedStore {
            inner: inner.clone(),
            hold_total: 3,
            gate: std::sync::Mutex::new(Some(rx)),
        });
        let client = Arc::new(VectorStoreClient::new(store, DIMS));
        let pipeline = IngestPipeline::new(Arc::new(TestEmbedder::new(DIMS)), client)
            .unwrap()
            .with_chunker(Chunker::new(25, 5).unwrap());

        let long = request(&three_paragraphs());
        let short = request("Only one short paragraph.");
        let releaser = async move {
            for _ in 0..200 {
                tokio::task::yield_now().await;
            }
            let _ = release.send(());
        };
        let (long_result, short_result, ()) =
            futures::join!(pipeline.ingest(&long), pipeline.ingest(&short), releaser);
        long_result.unwrap();
        short_result.unwrap();

        let meta = inner.get("u1:doc1:meta").unwrap().metadata;
        let content = inner.ids().len() - 1;
        assert_eq!(meta.total_chunks, Some(content));
        for i in 0..content {
            assert!(inner.contains(&format!("u1:doc1:{}", i)));
        }
        assert_eq!(pipeline.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_different_documents_do_not_share_a_lock() {
        let (store, pipeline) = pipeline(Arc::new(TestEmbedder::new(DIMS)));
        let mut other = request("Another document entirely.");
        other.document_id = "doc2".into();
        let first = request(&three_paragraphs());
        let (a, b) = futures::join!(
            pipeline.ingest(&first),
            pipeline.ingest(&other)
        );
        assert_eq!(a.unwrap().total_chunks, 3);
        assert_eq!(b.unwrap().total_chunks, 1);
        assert_eq!(store.ids().len(), 6);
        assert_eq!(pipeline.locks.len(), 0);
    }
}
