//! Embedder trait and vector utilities.
//!
//! Concrete providers (OpenAI, Ollama) live in the `grant-index` app
//! crate. Services receive an `Arc<dyn Embedder>` handle; there is no
//! process-wide embedding client.

use anyhow::Result;
use async_trait::async_trait;

use crate::error::{IndexError, IndexResult};

/// Deployment default dimensionality (`text-embedding-3-large`).
pub const DEFAULT_DIMS: usize = 3072;

/// Converts text into fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-large"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `3072`).
    fn dims(&self) -> usize;
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Fail fast when a vector's length differs from `expected`.
pub fn check_dims(expected: usize, vector: &[f32]) -> IndexResult<()> {
    if vector.len() != expected {
        return Err(IndexError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// The canonical placeholder vector for filter-only queries.
///
/// The store's query primitive always takes a similarity vector; lookups
/// that only care about metadata pass this one.
pub fn zero_vector(dims: usize) -> Vec<f32> {
    vec![0.0; dims]
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
