//! Scope adapters.
//!
//! The fallback engine is the same for every scope; what differs per
//! [`ScopeKind`] is which similarity procedure to call, the name of its
//! scope argument, and how the scope expands to its member documents for
//! the non-ranked tier.

use std::collections::HashSet;

use crate::error::StoreError;
use crate::models::{ContextRef, ScopeKind};
use crate::privilege::Privilege;
use crate::store::ChunkStore;

impl ScopeKind {
    /// The stored procedure that ranks chunks within this kind of scope.
    pub fn procedure(&self) -> &'static str {
        match self {
            ScopeKind::Document => "match_chunks",
            ScopeKind::Project => "match_chunks_for_project",
            ScopeKind::KnowledgeBase => "match_chunks_for_knowledge_base",
        }
    }

    /// The procedure's scope argument name.
    pub fn scope_param(&self) -> &'static str {
        match self {
            ScopeKind::Document => "document_id",
            ScopeKind::Project => "project_id",
            ScopeKind::KnowledgeBase => "knowledge_base_id",
        }
    }
}

/// Expand a scope to the concrete documents it covers.
///
/// - document: itself;
/// - project: its linked documents, then the documents of its backing
///   knowledge base, without duplicates;
/// - knowledge base: every non-deleted document with an indexed chunk.
///
/// An unknown project or knowledge base expands to nothing.
pub async fn resolve_member_documents<S: ChunkStore + ?Sized>(
    store: &S,
    scope: &ContextRef,
    privilege: Privilege,
) -> Result<Vec<String>, StoreError> {
    match scope.kind {
        ScopeKind::Document => Ok(vec![scope.id.clone()]),
        ScopeKind::KnowledgeBase => store.knowledge_base_document_ids(&scope.id, privilege).await,
        ScopeKind::Project => {
            let linked = store.project_document_ids(&scope.id, privilege).await?;
            let from_kb = match store.project_knowledge_base(&scope.id, privilege).await? {
                Some(kb_id) => store.knowledge_base_document_ids(&kb_id, privilege).await?,
                None => Vec::new(),
            };

            let mut seen = HashSet::new();
            Ok(linked
                .into_iter()
                .chain(from_kb)
                .filter(|id| seen.insert(id.clone()))
                .collect())
        }
    }
}
