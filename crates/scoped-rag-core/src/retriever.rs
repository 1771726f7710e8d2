//! Three-tier scoped chunk retrieval.
//!
//! Every scope kind shares one protocol:
//!
//! 1. **Ranked, caller privilege**: the scope's similarity procedure with
//!    the configured threshold and the requested limit.
//! 2. **Ranked, elevated privilege**: the identical call, if the
//!    [`PrivilegeEscalationPolicy`] allows it for the tier 1 failure.
//! 3. **Unranked**: expand the scope to its member documents and read up to
//!    `limit` embedded chunks from them, each given the fixed fallback score.
//!
//! Tier 1 and 2 failures are logged and never returned. Only a store error
//! in tier 3 surfaces, as [`RagError::Retrieval`]. A scope that expands to
//! no documents yields an empty list, which is not an error.

use tracing::{debug, warn};

use crate::embedding::format_vector_literal;
use crate::error::{RagError, Result, StoreError};
use crate::models::{ChunkResult, ContextRef};
use crate::privilege::{AlwaysEscalate, Privilege, PrivilegeEscalationPolicy};
use crate::scope::resolve_member_documents;
use crate::store::{ChunkStore, MatchCall};

/// Default minimum similarity for ranked search.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;
/// Placeholder score assigned to chunks from the unranked tier.
pub const DEFAULT_FALLBACK_SCORE: f64 = 0.8;
/// Default floor for the per-context fetch budget.
pub const DEFAULT_MIN_PER_CONTEXT: i64 = 5;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    /// Minimum similarity passed to the ranked procedures.
    pub similarity_threshold: f64,
    /// Score given to every chunk returned by the unranked tier.
    pub fallback_score: f64,
    /// Floor for the per-context budget in multi-context retrieval.
    pub min_per_context: i64,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            fallback_score: DEFAULT_FALLBACK_SCORE,
            min_per_context: DEFAULT_MIN_PER_CONTEXT,
        }
    }
}

/// Retrieves the top chunks for one scope over a [`ChunkStore`].
pub struct ScopedChunkRetriever<S> {
    store: S,
    policy: Box<dyn PrivilegeEscalationPolicy>,
    params: RetrievalParams,
}

impl<S: ChunkStore> ScopedChunkRetriever<S> {
    /// Create a retriever with default parameters and [`AlwaysEscalate`].
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: Box::new(AlwaysEscalate),
            params: RetrievalParams::default(),
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn PrivilegeEscalationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_params(mut self, params: RetrievalParams) -> Self {
        self.params = params;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn params(&self) -> &RetrievalParams {
        &self.params
    }

    pub fn policy(&self) -> &dyn PrivilegeEscalationPolicy {
        self.policy.as_ref()
    }

    /// Return up to `limit` relevant chunks from `scope`.
    ///
    /// `limit <= 0` returns an empty list without touching the store.
    pub async fn retrieve(
        &self,
        scope: &ContextRef,
        embedding: &[f32],
        limit: i64,
    ) -> Result<Vec<ChunkResult>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        if let Some(ranked) = self.ranked(scope, embedding, limit).await {
            return Ok(ranked);
        }

        self.unranked(scope, limit).await
    }

    /// Tiers 1 and 2. `None` means both were exhausted.
    async fn ranked(
        &self,
        scope: &ContextRef,
        embedding: &[f32],
        limit: i64,
    ) -> Option<Vec<ChunkResult>> {
        let call = MatchCall {
            procedure: scope.kind.procedure(),
            scope_param: scope.kind.scope_param(),
            scope_id: &scope.id,
            embedding,
            threshold: self.params.similarity_threshold,
            limit,
        };

        let failure = match self.store.match_chunks(&call, Privilege::Caller).await {
            Ok(rows) => {
                debug!(scope = %scope, rows = rows.len(), "ranked search succeeded");
                return Some(rows.into_iter().map(ChunkResult::from).collect());
            }
            Err(e) => e,
        };

        debug!(
            scope = %scope,
            procedure = call.procedure,
            error = %failure,
            vector = %VectorPreview(embedding),
            "ranked search failed at caller privilege"
        );

        let elevated = self.policy.escalate(scope, &failure)?;
        match self.store.match_chunks(&call, elevated).await {
            Ok(rows) => {
                debug!(scope = %scope, rows = rows.len(), privilege = %elevated, "ranked search succeeded after escalation");
                Some(rows.into_iter().map(ChunkResult::from).collect())
            }
            Err(e) => {
                warn!(
                    scope = %scope,
                    privilege = %elevated,
                    error = %e,
                    "ranked search failed after escalation, falling back to unranked chunks"
                );
                None
            }
        }
    }

    /// Tier 3.
    async fn unranked(&self, scope: &ContextRef, limit: i64) -> Result<Vec<ChunkResult>> {
        let privilege = self.policy.fallback_privilege();
        let to_retrieval_error = |source: StoreError| RagError::Retrieval {
            scope: scope.to_string(),
            source,
        };

        let document_ids = resolve_member_documents(&self.store, scope, privilege)
            .await
            .map_err(to_retrieval_error)?;

        if document_ids.is_empty() {
            debug!(scope = %scope, "scope has no member documents");
            return Ok(Vec::new());
        }

        let chunks = self
            .store
            .embedded_chunks(&document_ids, limit, privilege)
            .await
            .map_err(to_retrieval_error)?;

        debug!(
            scope = %scope,
            documents = document_ids.len(),
            chunks = chunks.len(),
            "unranked fallback returned chunks"
        );

        let score = self.params.fallback_score;
        Ok(chunks
            .into_iter()
            .map(|c| ChunkResult::unranked(c, score))
            .collect())
    }
}

/// Lazily formats the head of a query vector for debug logs.
struct VectorPreview<'a>(&'a [f32]);

impl std::fmt::Display for VectorPreview<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let head = &self.0[..self.0.len().min(4)];
        let literal = format_vector_literal(head);
        if self.0.len() > head.len() {
            write!(f, "{}… ({} dims)", literal.trim_end_matches(']'), self.0.len())
        } else {
            f.write_str(&literal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::NeverEscalate;
    use crate::store::memory::InMemoryStore;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.add_document("d1", "Pricing", None);
        store.add_chunk("c1", "d1", "furnace pricing", Some(vec![1.0, 0.0]));
        store.add_chunk("c2", "d1", "ac pricing", Some(vec![0.9, 0.1]));
        store
    }

    #[test]
    fn zero_or_negative_limit_skips_the_store() {
        let retriever = ScopedChunkRetriever::new(store());
        for limit in [0, -3] {
            let out = block_on(retriever.retrieve(&ContextRef::document("d1"), &[1.0, 0.0], limit)).unwrap();
            assert!(out.is_empty());
        }
        assert!(retriever.store().calls().is_empty());
    }

    #[test]
    fn tier_one_success_makes_a_single_call() {
        let retriever = ScopedChunkRetriever::new(store());
        let out = block_on(retriever.retrieve(&ContextRef::document("d1"), &[1.0, 0.0], 5)).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "c1");
        let calls = retriever.store().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation, "match_chunks");
        assert_eq!(calls[0].privilege, Privilege::Caller);
    }

    #[test]
    fn policy_rejection_escalates_to_elevated() {
        let s = store();
        s.reject_privilege(Privilege::Caller);
        let retriever = ScopedChunkRetriever::new(s);
        let out = block_on(retriever.retrieve(&ContextRef::document("d1"), &[1.0, 0.0], 5)).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| c.similarity_score > 0.9));
        let privileges: Vec<Privilege> = retriever.store().calls().iter().map(|c| c.privilege).collect();
        assert_eq!(privileges, vec![Privilege::Caller, Privilege::Elevated]);
    }

    #[test]
    fn never_escalate_skips_tier_two() {
        let s = store();
        s.drop_procedures();
        let retriever = ScopedChunkRetriever::new(s).with_policy(Box::new(NeverEscalate));
        let out = block_on(retriever.retrieve(&ContextRef::document("d1"), &[1.0, 0.0], 5)).unwrap();
        assert!(out.iter().all(|c| c.similarity_score == DEFAULT_FALLBACK_SCORE));
        let ops: Vec<(String, Privilege)> = retriever
            .store()
            .calls()
            .into_iter()
            .map(|c| (c.operation, c.privilege))
            .collect();
        assert_eq!(
            ops,
            vec![
                ("match_chunks".to_string(), Privilege::Caller),
                ("embedded_chunks".to_string(), Privilege::Caller),
            ]
        );
    }

    #[test]
    fn tier_three_failure_is_a_retrieval_error() {
        let s = store();
        s.drop_procedures();
        s.fail_reads();
        let retriever = ScopedChunkRetriever::new(s);
        let err = block_on(retriever.retrieve(&ContextRef::document("d1"), &[1.0, 0.0], 5)).unwrap_err();
        match err {
            RagError::Retrieval { scope, source } => {
                assert_eq!(scope, "document:d1");
                assert!(matches!(source, StoreError::Query(_)));
            }
            other => panic!("expected retrieval error, got {other:?}"),
        }
    }

    #[test]
    fn custom_fallback_score_is_applied() {
        let s = store();
        s.drop_procedures();
        let params = RetrievalParams {
            fallback_score: 0.42,
            ..RetrievalParams::default()
        };
        let retriever = ScopedChunkRetriever::new(s).with_params(params);
        let out = block_on(retriever.retrieve(&ContextRef::document("d1"), &[1.0, 0.0], 1)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].similarity_score, 0.42);
    }

    #[test]
    fn vector_preview_truncates_long_vectors() {
        let v = [0.5f32; 6];
        assert_eq!(VectorPreview(&v).to_string(), "[0.5,0.5,0.5,0.5… (6 dims)");
        assert_eq!(VectorPreview(&[1.0]).to_string(), "[1]");
    }
}
