//! Storage abstraction for retrieval.
//!
//! The [`ChunkStore`] trait covers every read the fallback engine needs from
//! the external chunk store: the three similarity procedures, and the table
//! reads behind the non-ranked fallback. The store owns chunks; nothing here
//! creates, mutates, or deletes them.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{MatchedChunk, StoredChunk};
use crate::privilege::Privilege;

/// Arguments for one similarity-procedure invocation.
#[derive(Debug, Clone)]
pub struct MatchCall<'a> {
    /// Procedure name, e.g. `match_chunks_for_project`.
    pub procedure: &'static str,
    /// Name of the scope argument, e.g. `project_id`.
    pub scope_param: &'static str,
    /// Scope identifier bound to `scope_param`.
    pub scope_id: &'a str,
    /// Query vector.
    pub embedding: &'a [f32],
    /// Minimum similarity a row must reach.
    pub threshold: f64,
    /// Maximum rows to return.
    pub limit: i64,
}

/// Abstract read-only chunk store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`match_chunks`](ChunkStore::match_chunks) | Ranked similarity search via a stored procedure |
/// | [`project_document_ids`](ChunkStore::project_document_ids) | Documents linked directly to a project |
/// | [`project_knowledge_base`](ChunkStore::project_knowledge_base) | A project's backing knowledge base |
/// | [`knowledge_base_document_ids`](ChunkStore::knowledge_base_document_ids) | Live, indexed documents of a knowledge base |
/// | [`embedded_chunks`](ChunkStore::embedded_chunks) | Unranked chunks with embeddings for a document set |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Run a similarity procedure at the given privilege.
    async fn match_chunks(
        &self,
        call: &MatchCall<'_>,
        privilege: Privilege,
    ) -> Result<Vec<MatchedChunk>, StoreError>;

    /// Ids of documents linked directly to a project.
    async fn project_document_ids(
        &self,
        project_id: &str,
        privilege: Privilege,
    ) -> Result<Vec<String>, StoreError>;

    /// The knowledge base backing a project, if any.
    async fn project_knowledge_base(
        &self,
        project_id: &str,
        privilege: Privilege,
    ) -> Result<Option<String>, StoreError>;

    /// Ids of non-deleted documents in a knowledge base that have at least
    /// one indexed chunk.
    async fn knowledge_base_document_ids(
        &self,
        knowledge_base_id: &str,
        privilege: Privilege,
    ) -> Result<Vec<String>, StoreError>;

    /// Up to `limit` chunks with a non-null embedding belonging to any of
    /// `document_ids`, in whatever order the store yields them.
    async fn embedded_chunks(
        &self,
        document_ids: &[String],
        limit: i64,
        privilege: Privilege,
    ) -> Result<Vec<StoredChunk>, StoreError>;
}

#[async_trait]
impl<T: ChunkStore + ?Sized> ChunkStore for Box<T> {
    async fn match_chunks(
        &self,
        call: &MatchCall<'_>,
        privilege: Privilege,
    ) -> Result<Vec<MatchedChunk>, StoreError> {
        (**self).match_chunks(call, privilege).await
    }

    async fn project_document_ids(
        &self,
        project_id: &str,
        privilege: Privilege,
    ) -> Result<Vec<String>, StoreError> {
        (**self).project_document_ids(project_id, privilege).await
    }

    async fn project_knowledge_base(
        &self,
        project_id: &str,
        privilege: Privilege,
    ) -> Result<Option<String>, StoreError> {
        (**self).project_knowledge_base(project_id, privilege).await
    }

    async fn knowledge_base_document_ids(
        &self,
        knowledge_base_id: &str,
        privilege: Privilege,
    ) -> Result<Vec<String>, StoreError> {
        (**self)
            .knowledge_base_document_ids(knowledge_base_id, privilege)
            .await
    }

    async fn embedded_chunks(
        &self,
        document_ids: &[String],
        limit: i64,
        privilege: Privilege,
    ) -> Result<Vec<StoredChunk>, StoreError> {
        (**self).embedded_chunks(document_ids, limit, privilege).await
    }
}
