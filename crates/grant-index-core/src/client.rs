//! Batching client over a [`VectorStore`].
//!
//! The client owns the two conventions the raw store leaves to callers:
//!
//! - **Batch size.** Writes and deletes are always split into batches of at
//!   most `batch_size` records (default [`DEFAULT_BATCH_SIZE`]), issued
//!   sequentially. Every batch is attempted; failures are collected per
//!   batch into a [`VectorStoreError`] alongside the batches that landed.
//! - **Dimensionality.** Records with the wrong vector length are rejected
//!   before anything is sent, and filter-only queries use the canonical
//!   [`zero_vector`] of the configured dimension.
//!
//! The client holds no mutable state and is shared behind an `Arc`.

use std::collections::HashSet;
use std::sync::Arc;

use crate::embedding::{check_dims, zero_vector};
use crate::error::{BatchFailure, IndexError, IndexResult, StoreOperation, VectorStoreError};
use crate::filter::MetadataFilter;
use crate::models::{VectorMatch, VectorRecord};
use crate::store::{QueryRequest, VectorStore};

/// Upstream ceiling on records per write or delete call.
pub const DEFAULT_BATCH_SIZE: usize = 100;

pub struct VectorStoreClient {
    store: Arc<dyn VectorStore>,
    dims: usize,
    batch_size: usize,
}

impl VectorStoreClient {
    pub fn new(store: Arc<dyn VectorStore>, dims: usize) -> Self {
        Self {
            store,
            dims,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the batch size (clamped to at least 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Upsert `records` in batches. Returns the number of records written.
    ///
    /// # Errors
    ///
    /// - [`IndexError::DimensionMismatch`] if any record has the wrong
    ///   vector length (nothing is written).
    /// - [`IndexError::VectorStore`] listing failed and succeeded batches.
    pub async fn upsert(&self, records: &[VectorRecord]) -> IndexResult<usize> {
        for r in records {
            check_dims(self.dims, &r.embedding)?;
        }
        if records.is_empty() {
            return Ok(0);
        }

        let total_batches = records.len().div_ceil(self.batch_size);
        let mut written = 0usize;
        let mut succeeded = Vec::new();
        let mut failures = Vec::new();

        for (batch_index, batch) in records.chunks(self.batch_size).enumerate() {
            match self.store.upsert(batch).await {
                Ok(n) => {
                    written += n;
                    succeeded.push(batch_index);
                }
                Err(e) => {
                    tracing::warn!(
                        batch_index,
                        total_batches,
                        error = %format!("{:#}", e),
                        "vector upsert batch failed"
                    );
                    failures.push(BatchFailure {
                        batch_index,
                        message: format!("{:#}", e),
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(VectorStoreError {
                operation: StoreOperation::Upsert,
                total_batches,
                succeeded,
                failures,
            }
            .into());
        }
        tracing::debug!(written, total_batches, "vector upsert complete");
        Ok(written)
    }

    /// Filter-only lookup using the zero query vector.
    pub async fn query_by_filter(
        &self,
        filter: MetadataFilter,
        top_k: usize,
        include_metadata: bool,
    ) -> IndexResult<Vec<VectorMatch>> {
        let request = QueryRequest {
            vector: zero_vector(self.dims),
            filter,
            top_k,
            include_metadata,
        };
        self.store
            .query(&request)
            .await
            .map_err(|e| IndexError::from(VectorStoreError::single(StoreOperation::Query, &e)))
    }

    /// Delete `ids` in batches. Duplicate ids are sent once.
    ///
    /// Returns the number of distinct ids submitted.
    pub async fn delete_many(&self, ids: &[String]) -> IndexResult<usize> {
        let mut seen = HashSet::new();
        let unique: Vec<String> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        if unique.is_empty() {
            return Ok(0);
        }

        let total_batches = unique.len().div_ceil(self.batch_size);
        let mut succeeded = Vec::new();
        let mut failures = Vec::new();

        for (batch_index, batch) in unique.chunks(self.batch_size).enumerate() {
            match self.store.delete_many(batch).await {
                Ok(()) => succeeded.push(batch_index),
                Err(e) => {
                    tracing::warn!(
                        batch_index,
                        total_batches,
                        error = %format!("{:#}", e),
                        "vector delete batch failed"
                    );
                    failures.push(BatchFailure {
                        batch_index,
                        message: format!("{:#}", e),
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(VectorStoreError {
                operation: StoreOperation::Delete,
                total_batches,
                succeeded,
                failures,
            }
            .into());
        }
        Ok(unique.len())
    }
}
