//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that turns a query into a dense
//! vector, plus pure helpers for formatting vectors for the store and for
//! computing similarity in the in-memory backend.
//!
//! Concrete providers (OpenAI-compatible HTTP) live in the `scoped-rag`
//! app crate.

use async_trait::async_trait;

use crate::error::Result;

/// Trait for embedding providers.
///
/// One call, one outbound request: implementations must not retry or cache.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single non-empty text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
}

/// Format a vector as the bracketed literal the similarity procedures accept.
///
/// ```rust
/// use scoped_rag_core::embedding::format_vector_literal;
///
/// assert_eq!(format_vector_literal(&[0.1, -2.0, 3.5]), "[0.1,-2,3.5]");
/// assert_eq!(format_vector_literal(&[]), "[]");
/// ```
pub fn format_vector_literal(vec: &[f32]) -> String {
    let parts: Vec<String> = vec.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, and zero-magnitude vectors.
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
