//! In-memory [`ChunkStore`] implementation for tests and local experiments.
//!
//! Documents, chunks, and projects live behind a `std::sync::RwLock`.
//! Similarity procedures are brute-force cosine similarity over every
//! stored vector in scope. Faults can be injected to exercise each fallback
//! tier: rejecting a privilege, dropping the procedures, failing table
//! reads, or failing every operation that touches a given id.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::StoreError;
use crate::models::{MatchedChunk, StoredChunk};
use crate::privilege::Privilege;

use super::{ChunkStore, MatchCall};

struct StoredDoc {
    id: String,
    title: String,
    knowledge_base_id: Option<String>,
    deleted: bool,
}

struct StoredChunkRow {
    id: String,
    document_id: String,
    content: String,
    embedding: Option<Vec<f32>>,
}

struct StoredProject {
    knowledge_base_id: Option<String>,
    document_ids: Vec<String>,
}

#[derive(Default)]
struct Faults {
    rejected: HashSet<Privilege>,
    procedures_missing: bool,
    reads_failing: bool,
    poisoned: HashSet<String>,
}

#[derive(Default)]
struct State {
    docs: Vec<StoredDoc>,
    chunks: Vec<StoredChunkRow>,
    projects: HashMap<String, StoredProject>,
    faults: Faults,
    calls: Vec<CallRecord>,
}

/// One operation observed by the store, in call order.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    /// Procedure name for similarity calls, otherwise the trait method name.
    pub operation: String,
    /// Scope or entity id the call was about (joined with `,` for document sets).
    pub target: String,
    pub privilege: Privilege,
    pub limit: Option<i64>,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_document(&self, id: &str, title: &str, knowledge_base_id: Option<&str>) {
        self.write().docs.push(StoredDoc {
            id: id.to_string(),
            title: title.to_string(),
            knowledge_base_id: knowledge_base_id.map(str::to_string),
            deleted: false,
        });
    }

    /// Soft-delete a document, hiding it from knowledge-base enumeration.
    pub fn delete_document(&self, id: &str) {
        let mut state = self.write();
        for doc in state.docs.iter_mut().filter(|d| d.id == id) {
            doc.deleted = true;
        }
    }

    /// Add a chunk. `None` for `embedding` models a chunk not yet indexed.
    pub fn add_chunk(&self, id: &str, document_id: &str, content: &str, embedding: Option<Vec<f32>>) {
        self.write().chunks.push(StoredChunkRow {
            id: id.to_string(),
            document_id: document_id.to_string(),
            content: content.to_string(),
            embedding,
        });
    }

    pub fn add_project(&self, id: &str, knowledge_base_id: Option<&str>, document_ids: &[&str]) {
        self.write().projects.insert(
            id.to_string(),
            StoredProject {
                knowledge_base_id: knowledge_base_id.map(str::to_string),
                document_ids: document_ids.iter().map(|d| d.to_string()).collect(),
            },
        );
    }

    /// Every call made at `privilege` fails with a policy rejection.
    pub fn reject_privilege(&self, privilege: Privilege) {
        self.write().faults.rejected.insert(privilege);
    }

    /// Similarity procedures report themselves unavailable.
    pub fn drop_procedures(&self) {
        self.write().faults.procedures_missing = true;
    }

    /// Table reads used by the non-ranked fallback fail.
    pub fn fail_reads(&self) {
        self.write().faults.reads_failing = true;
    }

    /// Every operation whose target includes `id` fails.
    pub fn poison(&self, id: &str) {
        self.write().faults.poisoned.insert(id.to_string());
    }

    /// Calls observed so far, in order.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.read().calls.clone()
    }

    fn record(&self, operation: &str, target: &str, privilege: Privilege, limit: Option<i64>) {
        self.write().calls.push(CallRecord {
            operation: operation.to_string(),
            target: target.to_string(),
            privilege,
            limit,
        });
    }

    fn check_read(&self, targets: &[&str], privilege: Privilege) -> Result<(), StoreError> {
        let state = self.read();
        if state.faults.rejected.contains(&privilege) {
            return Err(StoreError::PolicyRejection(format!(
                "permission denied for {} role",
                privilege
            )));
        }
        if state.faults.reads_failing {
            return Err(StoreError::Query("simulated read failure".to_string()));
        }
        if let Some(id) = targets.iter().find(|t| state.faults.poisoned.contains(**t)) {
            return Err(StoreError::Query(format!("simulated failure for {}", id)));
        }
        Ok(())
    }

    fn live_kb_documents(state: &State, knowledge_base_id: &str) -> Vec<String> {
        state
            .docs
            .iter()
            .filter(|d| !d.deleted && d.knowledge_base_id.as_deref() == Some(knowledge_base_id))
            .map(|d| d.id.clone())
            .collect()
    }

    fn scope_documents(state: &State, call: &MatchCall<'_>) -> HashSet<String> {
        match call.scope_param {
            "project_id" => match state.projects.get(call.scope_id) {
                Some(project) => {
                    let mut docs: HashSet<String> = project.document_ids.iter().cloned().collect();
                    if let Some(kb) = &project.knowledge_base_id {
                        docs.extend(Self::live_kb_documents(state, kb));
                    }
                    docs
                }
                None => HashSet::new(),
            },
            "knowledge_base_id" => Self::live_kb_documents(state, call.scope_id)
                .into_iter()
                .collect(),
            _ => std::iter::once(call.scope_id.to_string()).collect(),
        }
    }

    fn title_of(state: &State, document_id: &str) -> Option<String> {
        state
            .docs
            .iter()
            .find(|d| d.id == document_id)
            .map(|d| d.title.clone())
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn match_chunks(
        &self,
        call: &MatchCall<'_>,
        privilege: Privilege,
    ) -> Result<Vec<MatchedChunk>, StoreError> {
        self.record(call.procedure, call.scope_id, privilege, Some(call.limit));

        let state = self.read();
        if state.faults.rejected.contains(&privilege) {
            return Err(StoreError::PolicyRejection(format!(
                "permission denied for function as {} role",
                privilege
            )));
        }
        if state.faults.procedures_missing || state.faults.poisoned.contains(call.scope_id) {
            return Err(StoreError::ProcedureUnavailable {
                procedure: call.procedure.to_string(),
                message: "could not find the function in the schema cache".to_string(),
            });
        }

        let in_scope = Self::scope_documents(&state, call);
        let mut rows: Vec<MatchedChunk> = state
            .chunks
            .iter()
            .filter(|c| in_scope.contains(&c.document_id))
            .filter_map(|c| {
                let vector = c.embedding.as_ref()?;
                let sim = cosine_similarity(call.embedding, vector) as f64;
                (sim >= call.threshold).then(|| MatchedChunk {
                    id: c.id.clone(),
                    content: c.content.clone(),
                    document_id: c.document_id.clone(),
                    similarity_score: sim,
                    document_title: Self::title_of(&state, &c.document_id),
                })
            })
            .collect();

        rows.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        rows.truncate(usize::try_from(call.limit).unwrap_or(0));
        Ok(rows)
    }

    async fn project_document_ids(
        &self,
        project_id: &str,
        privilege: Privilege,
    ) -> Result<Vec<String>, StoreError> {
        self.record("project_document_ids", project_id, privilege, None);
        self.check_read(&[project_id], privilege)?;
        Ok(self
            .read()
            .projects
            .get(project_id)
            .map(|p| p.document_ids.clone())
            .unwrap_or_default())
    }

    async fn project_knowledge_base(
        &self,
        project_id: &str,
        privilege: Privilege,
    ) -> Result<Option<String>, StoreError> {
        self.record("project_knowledge_base", project_id, privilege, None);
        self.check_read(&[project_id], privilege)?;
        Ok(self
            .read()
            .projects
            .get(project_id)
            .and_then(|p| p.knowledge_base_id.clone()))
    }

    async fn knowledge_base_document_ids(
        &self,
        knowledge_base_id: &str,
        privilege: Privilege,
    ) -> Result<Vec<String>, StoreError> {
        self.record("knowledge_base_document_ids", knowledge_base_id, privilege, None);
        self.check_read(&[knowledge_base_id], privilege)?;

        let state = self.read();
        Ok(Self::live_kb_documents(&state, knowledge_base_id)
            .into_iter()
            .filter(|doc_id| {
                state
                    .chunks
                    .iter()
                    .any(|c| &c.document_id == doc_id && c.embedding.is_some())
            })
            .collect())
    }

    async fn embedded_chunks(
        &self,
        document_ids: &[String],
        limit: i64,
        privilege: Privilege,
    ) -> Result<Vec<StoredChunk>, StoreError> {
        self.record("embedded_chunks", &document_ids.join(","), privilege, Some(limit));
        let targets: Vec<&str> = document_ids.iter().map(String::as_str).collect();
        self.check_read(&targets, privilege)?;

        let state = self.read();
        Ok(state
            .chunks
            .iter()
            .filter(|c| c.embedding.is_some() && document_ids.contains(&c.document_id))
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|c| StoredChunk {
                id: c.id.clone(),
                content: c.content.clone(),
                document_id: c.document_id.clone(),
                document_title: Self::title_of(&state, &c.document_id),
            })
            .collect())
    }
}
