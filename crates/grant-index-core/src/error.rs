//! Error taxonomy for the index layer.
//!
//! | Variant | Retry? | Meaning |
//! |---------|--------|---------|
//! | [`IndexError::Validation`] | never | bad or missing input |
//! | [`IndexError::Embedding`] | whole call | embedding provider failed |
//! | [`IndexError::DimensionMismatch`] | never | provider returned the wrong vector length |
//! | [`IndexError::VectorStore`] | whole call | one or more store batches failed |
//! | [`IndexError::NotFound`] | n/a | a tenant-scoped query matched nothing |
//! | [`IndexError::CeilingReached`] | after raising the ceiling | scan may be truncated |
//! | [`IndexError::Relational`] | whole call | attachment store failed |
//!
//! Every write in this crate is idempotent by record id, so retrying a
//! failed ingestion or deletion call in full is always safe.

use std::fmt;

use thiserror::Error;

/// Result alias used across the core services.
pub type IndexResult<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{}", fmt_embedding(.chunk_index, .message))]
    Embedding {
        /// Index of the chunk whose embedding failed; `None` for the
        /// metadata summary.
        chunk_index: Option<usize>,
        message: String,
    },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("query returned {ceiling} matches, the scan ceiling; results may be truncated")]
    CeilingReached { ceiling: usize },

    #[error("relational store error: {0:#}")]
    Relational(anyhow::Error),
}

fn fmt_embedding(chunk_index: &Option<usize>, message: &str) -> String {
    match chunk_index {
        Some(i) => format!("embedding failed for chunk {}: {}", i, message),
        None => format!("embedding failed for metadata summary: {}", message),
    }
}

impl IndexError {
    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IndexError::Embedding { .. } | IndexError::VectorStore(_) | IndexError::Relational(_)
        )
    }
}

/// The store operation a [`VectorStoreError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    Upsert,
    Query,
    Delete,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreOperation::Upsert => "upsert",
            StoreOperation::Query => "query",
            StoreOperation::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// One failed batch within a store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub message: String,
}

/// Failure of one or more batches of a vector store call.
///
/// `succeeded` lists the batch indices that landed, so partial progress
/// (e.g. 3 of 5 delete batches) stays observable.
#[derive(Debug, Clone)]
pub struct VectorStoreError {
    pub operation: StoreOperation,
    pub total_batches: usize,
    pub succeeded: Vec<usize>,
    pub failures: Vec<BatchFailure>,
}

impl fmt::Display for VectorStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self
            .failures
            .iter()
            .map(|b| b.batch_index.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "vector store {} failed for batch(es) {} ({} of {} batches succeeded)",
            self.operation,
            failed,
            self.succeeded.len(),
            self.total_batches
        )?;
        if let Some(first) = self.failures.first() {
            write!(f, ": {}", first.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for VectorStoreError {}

impl VectorStoreError {
    /// A single-call failure (queries are never batched).
    pub fn single(operation: StoreOperation, err: &anyhow::Error) -> Self {
        Self {
            operation,
            total_batches: 1,
            succeeded: Vec::new(),
            failures: vec![BatchFailure {
                batch_index: 0,
                message: format!("{:#}", err),
            }],
        }
    }

    pub fn failed_batches(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.batch_index).collect()
    }
}
