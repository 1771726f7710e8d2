//! Core data models that flow through retrieval.
//!
//! [`ContextRef`] names a scope supplied by the caller. [`MatchedChunk`] and
//! [`StoredChunk`] are rows read from the external store; [`ChunkResult`] is
//! the record this crate hands back.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// The kind of boundary a retrieval is confined to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeKind {
    Document,
    Project,
    KnowledgeBase,
}

impl ScopeKind {
    /// Wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Document => "document",
            ScopeKind::Project => "project",
            ScopeKind::KnowledgeBase => "knowledgeBase",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged reference to one retrieval scope.
///
/// Serializes as `{"type": "document", "id": "doc-1"}`. Parses from
/// `kind:id` strings such as `document:doc-1`, `project:p-7` or
/// `knowledge-base:kb-2` (`kb:` and `knowledgeBase:` are accepted too).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextRef {
    #[serde(rename = "type")]
    pub kind: ScopeKind,
    pub id: String,
}

impl ContextRef {
    pub fn new(kind: ScopeKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn document(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Document, id)
    }

    pub fn project(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Project, id)
    }

    pub fn knowledge_base(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::KnowledgeBase, id)
    }
}

impl fmt::Display for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for ContextRef {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s.split_once(':').ok_or_else(|| {
            RagError::InvalidInput(format!(
                "context '{}' must look like <kind>:<id>, e.g. document:abc",
                s
            ))
        })?;

        let kind = match kind.trim() {
            "document" | "doc" => ScopeKind::Document,
            "project" => ScopeKind::Project,
            "knowledge-base" | "knowledgeBase" | "knowledge_base" | "kb" => {
                ScopeKind::KnowledgeBase
            }
            other => {
                return Err(RagError::InvalidInput(format!(
                    "unknown context kind '{}'. Use document, project, or knowledge-base.",
                    other
                )))
            }
        };

        let id = id.trim();
        if id.is_empty() {
            return Err(RagError::InvalidInput(format!(
                "context '{}' has an empty id",
                s
            )));
        }

        Ok(ContextRef::new(kind, id))
    }
}

/// A row returned by a server-side similarity procedure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatchedChunk {
    pub id: String,
    pub content: String,
    pub document_id: String,
    #[serde(alias = "similarity")]
    pub similarity_score: f64,
    #[serde(default)]
    pub document_title: Option<String>,
}

/// A chunk read without ranking by the non-ranked fallback tier.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: String,
    pub content: String,
    pub document_id: String,
    pub document_title: Option<String>,
}

/// One retrieved chunk, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResult {
    pub id: String,
    pub content: String,
    pub document_id: String,
    /// Cosine similarity in `[0, 1]`, or the fixed fallback score when the
    /// chunk came from the non-ranked tier.
    pub similarity_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_title: Option<String>,
}

impl From<MatchedChunk> for ChunkResult {
    fn from(row: MatchedChunk) -> Self {
        Self {
            id: row.id,
            content: row.content,
            document_id: row.document_id,
            similarity_score: row.similarity_score,
            document_title: row.document_title,
        }
    }
}

impl ChunkResult {
    /// Build a result from an unranked chunk with a placeholder score.
    pub fn unranked(chunk: StoredChunk, score: f64) -> Self {
        Self {
            id: chunk.id,
            content: chunk.content,
            document_id: chunk.document_id,
            similarity_score: score,
            document_title: chunk.document_title,
        }
    }
}
