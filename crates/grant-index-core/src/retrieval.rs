//! Listing, inspection and deletion of indexed documents.
//!
//! Every lookup goes through [`MetadataFilter::for_user`], so results and
//! deletions are always confined to one owner even when two users share a
//! `documentId` or file name.
//!
//! Deletion first enumerates the ids to remove with a filter-only query
//! capped at the scan ceiling. A result exactly at the ceiling may be
//! truncated, so it fails with [`IndexError::CeilingReached`] before
//! anything is deleted.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::client::VectorStoreClient;
use crate::error::{IndexError, IndexResult};
use crate::filter::MetadataFilter;
use crate::models::{validate_id_part, DocumentIndexEntry, VectorMatch};

/// Metadata records fetched by [`RetrievalService::list_documents`].
pub const DEFAULT_MAX_DOCUMENTS: usize = 100;

/// Records fetched when enumerating a document or file name.
pub const DEFAULT_SCAN_CEILING: usize = 1000;

/// Outcome of a deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    /// Records removed, content and metadata together.
    pub deleted: usize,
    /// Distinct documents the removed records belonged to, sorted.
    pub document_ids: Vec<String>,
}

pub struct RetrievalService {
    client: Arc<VectorStoreClient>,
    max_documents: usize,
    scan_ceiling: usize,
}

impl RetrievalService {
    pub fn new(client: Arc<VectorStoreClient>) -> Self {
        Self {
            client,
            max_documents: DEFAULT_MAX_DOCUMENTS,
            scan_ceiling: DEFAULT_SCAN_CEILING,
        }
    }

    pub fn with_max_documents(mut self, max_documents: usize) -> Self {
        self.max_documents = max_documents.max(1);
        self
    }

    pub fn with_scan_ceiling(mut self, scan_ceiling: usize) -> Self {
        self.scan_ceiling = scan_ceiling.max(2);
        self
    }

    /// The user's indexed documents, newest first.
    ///
    /// Only documents whose metadata record exists are listed; a document
    /// whose ingestion never finished does not appear.
    pub async fn list_documents(&self, user_id: &str) -> IndexResult<Vec<DocumentIndexEntry>> {
        validate_id_part("userId", user_id)?;
        let filter = MetadataFilter::for_user(user_id).metadata_records(true);
        let matches = self
            .client
            .query_by_filter(filter, self.max_documents, true)
            .await?;

        if matches.len() >= self.max_documents {
            tracing::warn!(
                user_id,
                max_documents = self.max_documents,
                "document listing hit its cap; older documents may be missing"
            );
        }

        let mut entries: Vec<DocumentIndexEntry> = matches
            .iter()
            .filter_map(|m| m.metadata.as_ref())
            .filter_map(DocumentIndexEntry::from_metadata)
            .collect();
        entries.sort_by(|a, b| match (a.created_at, b.created_at) {
            (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.id.cmp(&b.id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
        Ok(entries)
    }

    /// Every record of one document, metadata record first, then content
    /// records by `chunkIndex`.
    ///
    /// Returns an empty list when the document has no records.
    pub async fn list_vectors_for_document(
        &self,
        user_id: &str,
        document_id: &str,
    ) -> IndexResult<Vec<VectorMatch>> {
        validate_id_part("userId", user_id)?;
        validate_id_part("documentId", document_id)?;
        let filter = MetadataFilter::for_user(user_id).document(document_id);
        let mut matches = self.scan(filter, true).await?;
        matches.sort_by_key(|m| {
            let meta = m.metadata.as_ref();
            let is_metadata = meta.map(|md| md.is_metadata).unwrap_or(false);
            let chunk = meta.and_then(|md| md.chunk_index).unwrap_or(usize::MAX);
            (!is_metadata, chunk, m.id.clone())
        });
        Ok(matches)
    }

    /// Delete every record of one document.
    ///
    /// # Errors
    ///
    /// - [`IndexError::NotFound`] when the user has no such document.
    /// - [`IndexError::CeilingReached`] when the enumeration may be
    ///   truncated; nothing is deleted.
    /// - [`IndexError::VectorStore`] when delete batches failed. Batches
    ///   that landed stay deleted; retrying finishes the job.
    pub async fn delete_document(&self, user_id: &str, document_id: &str) -> IndexResult<DeleteReport> {
        validate_id_part("userId", user_id)?;
        validate_id_part("documentId", document_id)?;
        let filter = MetadataFilter::for_user(user_id).document(document_id);
        self.delete_matching(filter, || format!("document '{}'", document_id))
            .await
    }

    /// Delete every record of every document named `file_name` owned by
    /// the user.
    ///
    /// Errors as [`delete_document`](Self::delete_document).
    pub async fn delete_by_file_name(&self, user_id: &str, file_name: &str) -> IndexResult<DeleteReport> {
        validate_id_part("userId", user_id)?;
        if file_name.trim().is_empty() {
            return Err(IndexError::Validation("fileName must not be empty".to_string()));
        }
        let filter = MetadataFilter::for_user(user_id).file_name(file_name);
        self.delete_matching(filter, || format!("file '{}'", file_name))
            .await
    }

    async fn delete_matching(
        &self,
        filter: MetadataFilter,
        describe: impl Fn() -> String,
    ) -> IndexResult<DeleteReport> {
        let user_id = filter.user_id().unwrap_or_default().to_string();
        let matches = self.scan(filter, true).await?;
        if matches.is_empty() {
            return Err(IndexError::NotFound(format!(
                "{} for user '{}'",
                describe(),
                user_id
            )));
        }

        let document_ids: BTreeSet<String> = matches
            .iter()
            .filter_map(|m| m.metadata.as_ref())
            .map(|md| md.document_id.clone())
            .collect();
        let ids: Vec<String> = matches.into_iter().map(|m| m.id).collect();
        let deleted = self.client.delete_many(&ids).await?;

        tracing::info!(
            user_id = %user_id,
            target = %describe(),
            deleted,
            "deleted vectors"
        );
        Ok(DeleteReport {
            deleted,
            document_ids: document_ids.into_iter().collect(),
        })
    }

    /// Filter-only query at the scan ceiling; a full page is an error.
    async fn scan(&self, filter: MetadataFilter, include_metadata: bool) -> IndexResult<Vec<VectorMatch>> {
        let matches = self
            .client
            .query_by_filter(filter, self.scan_ceiling, include_metadata)
            .await?;
        if matches.len() >= self.scan_ceiling {
            tracing::error!(
                ceiling = self.scan_ceiling,
                "scan reached its ceiling; refusing to act on a possibly truncated result"
            );
            return Err(IndexError::CeilingReached {
                ceiling: self.scan_ceiling,
            });
        }
        Ok(matches)
    }
}
