//! Multi-context retrieval aggregation.
//!
//! Fans one query embedding out over a heterogeneous list of scopes and
//! merges what comes back.
//!
//! # Merge Algorithm
//!
//! 1. `per_context = max(min_per_context, ceil(total_limit / contexts))`.
//! 2. Retrieve every context concurrently through the
//!    [`ScopedChunkRetriever`]. A failing context contributes nothing.
//! 3. Concatenate results in context input order.
//! 4. Deduplicate by chunk id; the first occurrence wins.
//! 5. Stable sort by similarity score, descending.
//! 6. Truncate to `total_limit`.

use std::collections::HashSet;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::RagError;
use crate::models::{ChunkResult, ContextRef};
use crate::retriever::ScopedChunkRetriever;
use crate::store::ChunkStore;

/// Fetch budget for each context: an even share of `total_limit`, never
/// below `floor`.
///
/// ```rust
/// use scoped_rag_core::per_context_limit;
///
/// assert_eq!(per_context_limit(10, 1, 5), 10);
/// assert_eq!(per_context_limit(10, 3, 5), 5);
/// assert_eq!(per_context_limit(20, 3, 5), 7);
/// ```
pub fn per_context_limit(total_limit: i64, contexts: usize, floor: i64) -> i64 {
    if contexts == 0 {
        return floor;
    }
    let n = i64::try_from(contexts).unwrap_or(i64::MAX);
    let share = total_limit / n + i64::from(total_limit % n > 0);
    share.max(floor)
}

/// What one context contributed to an aggregated retrieval.
#[derive(Debug)]
pub struct ContextOutcome {
    pub context: ContextRef,
    /// Chunks this context returned, before deduplication.
    pub chunks: usize,
    /// Set when the context failed and contributed nothing.
    pub error: Option<RagError>,
}

/// Merges scoped retrievals across many contexts.
pub struct MultiContextAggregator<S> {
    retriever: ScopedChunkRetriever<S>,
}

impl<S: ChunkStore> MultiContextAggregator<S> {
    pub fn new(retriever: ScopedChunkRetriever<S>) -> Self {
        Self { retriever }
    }

    pub fn retriever(&self) -> &ScopedChunkRetriever<S> {
        &self.retriever
    }

    /// Retrieve across `contexts` and return at most `total_limit` unique
    /// chunks, best first.
    pub async fn retrieve_across(
        &self,
        contexts: &[ContextRef],
        embedding: &[f32],
        total_limit: i64,
    ) -> Vec<ChunkResult> {
        self.retrieve_across_with_report(contexts, embedding, total_limit)
            .await
            .0
    }

    /// Like [`retrieve_across`](Self::retrieve_across), also reporting what
    /// each context contributed.
    pub async fn retrieve_across_with_report(
        &self,
        contexts: &[ContextRef],
        embedding: &[f32],
        total_limit: i64,
    ) -> (Vec<ChunkResult>, Vec<ContextOutcome>) {
        if contexts.is_empty() || total_limit <= 0 {
            return (Vec::new(), Vec::new());
        }

        let per_context = per_context_limit(
            total_limit,
            contexts.len(),
            self.retriever.params().min_per_context,
        );
        debug!(
            contexts = contexts.len(),
            per_context, total_limit, "retrieving across contexts"
        );

        let results = join_all(
            contexts
                .iter()
                .map(|ctx| self.retriever.retrieve(ctx, embedding, per_context)),
        )
        .await;

        let mut merged: Vec<ChunkResult> = Vec::new();
        let mut outcomes = Vec::with_capacity(contexts.len());

        for (ctx, result) in contexts.iter().zip(results) {
            match result {
                Ok(chunks) => {
                    outcomes.push(ContextOutcome {
                        context: ctx.clone(),
                        chunks: chunks.len(),
                        error: None,
                    });
                    merged.extend(chunks);
                }
                Err(e) => {
                    warn!(context = %ctx, error = %e, "context retrieval failed, skipping");
                    outcomes.push(ContextOutcome {
                        context: ctx.clone(),
                        chunks: 0,
                        error: Some(e),
                    });
                }
            }
        }

        (merge_results(merged, total_limit), outcomes)
    }
}

/// Deduplicate by id (first wins), stable-sort by score descending, and
/// truncate to `limit`.
pub fn merge_results(results: Vec<ChunkResult>, limit: i64) -> Vec<ChunkResult> {
    let mut seen: HashSet<String> = HashSet::with_capacity(results.len());
    let mut unique: Vec<ChunkResult> = results
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect();

    unique.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    unique.truncate(usize::try_from(limit).unwrap_or(0));
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, doc: &str, score: f64) -> ChunkResult {
        ChunkResult {
            id: id.to_string(),
            content: format!("content of {id}"),
            document_id: doc.to_string(),
            similarity_score: score,
            document_title: None,
        }
    }

    #[test]
    fn test_budget_floor() {
        assert_eq!(per_context_limit(1, 1, 5), 5);
        assert_eq!(per_context_limit(0, 4, 5), 5);
        assert_eq!(per_context_limit(100, 40, 5), 5);
        assert_eq!(per_context_limit(100, 3, 5), 34);
    }

    #[test]
    fn test_budget_for_huge_totals() {
        assert_eq!(per_context_limit(i64::MAX, 1, 5), i64::MAX);
        assert_eq!(per_context_limit(i64::MAX, 2, 5), i64::MAX / 2 + 1);
        assert_eq!(per_context_limit(i64::MAX - 1, 2, 5), (i64::MAX - 1) / 2);
    }

    #[test]
    fn test_merge_first_occurrence_wins() {
        let merged = merge_results(
            vec![
                result("c1", "d1", 0.7),
                result("c2", "d1", 0.9),
                ChunkResult {
                    content: "duplicate".into(),
                    ..result("c1", "d2", 0.99)
                },
            ],
            10,
        );
        assert_eq!(merged.len(), 2);
        let c1 = merged.iter().find(|r| r.id == "c1").unwrap();
        assert_eq!(c1.document_id, "d1");
        assert_eq!(c1.similarity_score, 0.7);
    }

    #[test]
    fn test_merge_sorts_descending_and_keeps_ties_stable() {
        let merged = merge_results(
            vec![
                result("a", "d", 0.8),
                result("b", "d", 0.95),
                result("c", "d", 0.8),
                result("e", "d", 0.6),
            ],
            10,
        );
        let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c", "e"]);
    }

    #[test]
    fn test_merge_truncates() {
        let input: Vec<ChunkResult> = (0..10)
            .map(|i| result(&format!("c{i}"), "d", i as f64 / 10.0))
            .collect();
        assert_eq!(merge_results(input.clone(), 3).len(), 3);
        assert!(merge_results(input, 0).is_empty());
    }
}
